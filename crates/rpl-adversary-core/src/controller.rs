//! Attack Controller
//!
//! Holds the capability set, the per-attack enable flags, the fake identity
//! and the flood timer. Once per reachable cycle it walks the equipped attacks
//! in fixed order, runs the enabled ones and folds their modifiers into a
//! single [`Directive`].
//!
//! Flags are only written between cycles (`set_attack`, `set_flags`), so they
//! are stable for the whole of `apply`.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::attacks::{behaviour_for, Attack, AttackContext, AttackEffect, DirectiveModifier};
use crate::config::{validate_flags, AttackFlags, AttackKind, AttackSet, FakeIdentity};
use crate::errors::{AdversaryError, Result};
use crate::routing::RoutingStateMutator;
use crate::scheduler::FloodTimer;
use crate::types::Timestamp;

/// Transmission decision for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Send,
    Skip,
}

/// Effects of one controller pass; five attacks at most
pub type CycleEffects = SmallVec<[AttackEffect; 5]>;

/// Per-cycle attack injection
pub struct AttackController {
    capabilities: AttackSet,
    attacks: Vec<Box<dyn Attack>>,
    flags: AttackFlags,
    fake_identity: FakeIdentity,
    flood_timer: FloodTimer,
}

impl AttackController {
    /// Compose the behaviours in `capabilities`
    pub fn new(
        capabilities: AttackSet,
        flags: AttackFlags,
        fake_identity: FakeIdentity,
        flood_timer: FloodTimer,
    ) -> Result<Self> {
        validate_flags(&capabilities, &flags)?;
        let attacks = capabilities.iter().map(behaviour_for).collect();

        Ok(Self {
            capabilities,
            attacks,
            flags,
            fake_identity,
            flood_timer,
        })
    }

    pub fn flags(&self) -> AttackFlags {
        self.flags
    }

    pub fn capabilities(&self) -> AttackSet {
        self.capabilities
    }

    pub fn fake_identity(&self) -> FakeIdentity {
        self.fake_identity
    }

    pub fn flood_timer(&self) -> &FloodTimer {
        &self.flood_timer
    }

    /// Toggle one attack; must not be called while a cycle is in flight
    pub fn set_attack(&mut self, kind: AttackKind, enabled: bool) -> Result<()> {
        if enabled && !self.capabilities.contains(kind) {
            return Err(AdversaryError::AttackUnavailable { attack: kind });
        }
        self.flags.set(kind, enabled);
        Ok(())
    }

    /// Replace all flags at once; must not be called while a cycle is in flight
    pub fn set_flags(&mut self, flags: AttackFlags) -> Result<()> {
        validate_flags(&self.capabilities, &flags)?;
        self.flags = flags;
        Ok(())
    }

    pub fn set_fake_identity(&mut self, fake_identity: FakeIdentity) {
        self.fake_identity = fake_identity;
    }

    /// Run the enabled attacks in order and decide the cycle's directive
    ///
    /// Failing steps are reported in the returned effects and skipped; they
    /// never abort the cycle.
    pub fn apply(
        &mut self,
        now: Timestamp,
        sequence: u32,
        state: RoutingStateMutator<'_>,
    ) -> (Directive, CycleEffects) {
        let flags = self.flags;
        let mut ctx = AttackContext {
            now,
            sequence,
            fake_identity: self.fake_identity,
            state,
            flood_timer: &mut self.flood_timer,
        };

        let mut directive = Directive::Send;
        let mut effects = CycleEffects::new();

        for attack in &self.attacks {
            let kind = attack.kind();
            let enabled = flags.is_enabled(kind);
            debug!(attack = kind.tag(), enabled, "attack flag state");
            if !enabled {
                continue;
            }

            match attack.apply(&mut ctx) {
                Ok(outcome) => {
                    if let Some(effect) = outcome.effect {
                        effects.push(effect);
                    }
                    if outcome.modifier == DirectiveModifier::Drop {
                        directive = Directive::Skip;
                    }
                }
                Err(AdversaryError::NoActiveTopology { attack }) => {
                    warn!(attack = attack.tag(), "failed to access RPL DAG, step skipped");
                    effects.push(AttackEffect::TopologyMissing { attack });
                }
                Err(e) => {
                    warn!(attack = kind.tag(), error = %e, "attack step failed, skipped");
                    effects.push(AttackEffect::StepFailed {
                        attack: kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        (directive, effects)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;
    use std::time::Duration;

    use super::*;
    use crate::config::AttackProfile;
    use crate::routing::{IdentityManager, RoutingEngine, Topology};
    use crate::types::{DagVersion, LinkAddr, Rank};

    struct Engine {
        topology: Option<Topology>,
        solicitations: usize,
    }

    impl Engine {
        fn joined() -> Self {
            Self {
                topology: Some(Topology {
                    instance_id: 30,
                    dodag_id: Ipv6Addr::LOCALHOST,
                    rank: Rank::new(512),
                    version: DagVersion::new(240),
                }),
                solicitations: 0,
            }
        }
    }

    impl RoutingEngine for Engine {
        fn is_reachable(&self) -> bool {
            true
        }

        fn root_address(&self) -> Option<Ipv6Addr> {
            Some(Ipv6Addr::LOCALHOST)
        }

        fn active_topology(&self) -> Option<Topology> {
            self.topology
        }

        fn modify_topology(&mut self, update: &mut dyn FnMut(&mut Topology)) -> bool {
            match self.topology.as_mut() {
                Some(topology) => {
                    update(topology);
                    true
                }
                None => false,
            }
        }

        fn send_control_solicitation(&mut self, _target: Option<Ipv6Addr>) -> Result<()> {
            self.solicitations += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Identity(LinkAddr);

    impl IdentityManager for Identity {
        fn node_identity(&self) -> LinkAddr {
            self.0
        }

        fn set_node_identity(&mut self, id: LinkAddr) {
            self.0 = id;
        }

        fn derive_network_address(&mut self, _id: &LinkAddr) -> Ipv6Addr {
            Ipv6Addr::UNSPECIFIED
        }
    }

    fn controller(flags: AttackFlags) -> AttackController {
        AttackController::new(
            AttackSet::all(),
            flags,
            FakeIdentity::new(0x2a),
            FloodTimer::new(Duration::from_secs(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_apply_runs_enabled_attacks_in_order() {
        let mut engine = Engine::joined();
        let mut identity = Identity::default();
        let mut ctrl = controller(AttackFlags::all());

        let (directive, effects) = ctrl.apply(
            Timestamp::new(1_000),
            3,
            RoutingStateMutator::new(&mut engine, &mut identity),
        );

        assert_eq!(directive, Directive::Skip);
        assert_eq!(effects.len(), 5);
        assert!(matches!(effects[0], AttackEffect::IdentitySpoofed { .. }));
        assert!(matches!(effects[1], AttackEffect::SolicitationSent { .. }));
        assert!(matches!(effects[2], AttackEffect::VersionBumped { .. }));
        assert!(matches!(effects[3], AttackEffect::RankForced { .. }));
        assert_eq!(effects[4], AttackEffect::PacketDropped { seq: 3 });

        let topology = engine.topology.unwrap();
        assert_eq!(topology.rank, Rank::MIN);
        assert_eq!(topology.version, DagVersion::new(241));
        assert_eq!(engine.solicitations, 1);
        assert_eq!(identity.0, FakeIdentity::new(0x2a).link_addr());
    }

    #[test]
    fn test_flood_timer_survives_across_cycles() {
        let mut engine = Engine::joined();
        let mut identity = Identity::default();
        let flags = AttackFlags::default().with(AttackKind::ControlFlood, true);
        let mut ctrl = controller(flags);

        for now in [0, 1_000, 4_999, 5_000] {
            let (directive, _) = ctrl.apply(
                Timestamp::new(now),
                0,
                RoutingStateMutator::new(&mut engine, &mut identity),
            );
            assert_eq!(directive, Directive::Send);
        }

        assert_eq!(engine.solicitations, 2);
        assert!(ctrl.flood_timer().is_armed());
    }

    #[test]
    fn test_missing_topology_is_reported_not_fatal() {
        let mut engine = Engine {
            topology: None,
            solicitations: 0,
        };
        let mut identity = Identity::default();
        let flags = AttackFlags::default()
            .with(AttackKind::VersionTamper, true)
            .with(AttackKind::Sinkhole, true);
        let mut ctrl = controller(flags);

        let (directive, effects) = ctrl.apply(
            Timestamp::ZERO,
            0,
            RoutingStateMutator::new(&mut engine, &mut identity),
        );

        assert_eq!(directive, Directive::Send);
        assert_eq!(
            effects.as_slice(),
            &[
                AttackEffect::TopologyMissing {
                    attack: AttackKind::VersionTamper
                },
                AttackEffect::TopologyMissing {
                    attack: AttackKind::Sinkhole
                },
            ]
        );
    }

    #[test]
    fn test_unavailable_attack_rejected() {
        let mut ctrl = AttackController::new(
            AttackProfile::SelectiveForwarding.capabilities(),
            AttackFlags::default(),
            FakeIdentity::default(),
            FloodTimer::new(Duration::from_secs(5)),
        )
        .unwrap();

        assert!(ctrl.set_attack(AttackKind::Sinkhole, true).is_ok());
        assert!(matches!(
            ctrl.set_attack(AttackKind::ControlFlood, true),
            Err(AdversaryError::AttackUnavailable { .. })
        ));
        assert!(ctrl.set_attack(AttackKind::ControlFlood, false).is_ok());
    }
}
