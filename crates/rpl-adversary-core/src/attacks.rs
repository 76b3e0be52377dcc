//! Attack behaviours
//!
//! Each attack is a small stateless behaviour implementing [`Attack`]. The
//! controller composes the ones a node is equipped with into a list at
//! configuration time and runs the enabled ones, in [`AttackKind::ALL`] order,
//! once per reachable cycle.

use std::net::Ipv6Addr;

use tracing::info;

use crate::config::{AttackKind, FakeIdentity};
use crate::errors::{AdversaryError, Result};
use crate::routing::RoutingStateMutator;
use crate::scheduler::FloodTimer;
use crate::types::{DagVersion, LinkAddr, Rank, Timestamp};

// ----------------------------------------------------------------------------
// Step Results
// ----------------------------------------------------------------------------

/// How an attack step bends the cycle's transmission directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveModifier {
    /// Leave the directive as it is
    Keep,
    /// Turn the cycle into a counted drop
    Drop,
}

/// Observable effect of one attack step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackEffect {
    IdentitySpoofed { identity: LinkAddr, address: Ipv6Addr },
    SolicitationSent { next_allowed: Timestamp },
    VersionBumped { from: DagVersion, to: DagVersion },
    RankForced { from: Rank, to: Rank },
    PacketDropped { seq: u32 },
    /// Version/rank step skipped because the node has joined no DODAG
    TopologyMissing { attack: AttackKind },
    /// Step failed for another reason and was skipped
    StepFailed { attack: AttackKind, reason: String },
}

/// Result of applying one attack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub effect: Option<AttackEffect>,
    pub modifier: DirectiveModifier,
}

impl StepOutcome {
    pub fn keep(effect: AttackEffect) -> Self {
        Self {
            effect: Some(effect),
            modifier: DirectiveModifier::Keep,
        }
    }

    pub fn idle() -> Self {
        Self {
            effect: None,
            modifier: DirectiveModifier::Keep,
        }
    }

    pub fn drop(effect: AttackEffect) -> Self {
        Self {
            effect: Some(effect),
            modifier: DirectiveModifier::Drop,
        }
    }
}

// ----------------------------------------------------------------------------
// Attack Context
// ----------------------------------------------------------------------------

/// Everything an attack may read or touch during one cycle
///
/// The timer lives in the controller while the routing state is borrowed from
/// the caller, so the two borrows carry separate lifetimes.
pub struct AttackContext<'a, 's> {
    pub now: Timestamp,
    /// Value of the `sent` counter at the start of the cycle
    pub sequence: u32,
    pub fake_identity: FakeIdentity,
    pub state: RoutingStateMutator<'s>,
    pub flood_timer: &'a mut FloodTimer,
}

/// Common contract of every attack behaviour
pub trait Attack: Send {
    fn kind(&self) -> AttackKind;

    fn apply(&self, ctx: &mut AttackContext<'_, '_>) -> Result<StepOutcome>;
}

/// Build the behaviour implementing `kind`
pub fn behaviour_for(kind: AttackKind) -> Box<dyn Attack> {
    match kind {
        AttackKind::IdentitySpoof => Box::new(IdentitySpoof),
        AttackKind::ControlFlood => Box::new(ControlFlood),
        AttackKind::VersionTamper => Box::new(VersionTamper),
        AttackKind::Sinkhole => Box::new(Sinkhole),
        AttackKind::SelectiveForwarding => Box::new(SelectiveForwarding),
    }
}

// ----------------------------------------------------------------------------
// Sybil
// ----------------------------------------------------------------------------

/// Re-derive and re-assign the fake link identity every cycle
///
/// Idempotent: the same fake ID always yields the same identity, and nothing
/// ever restores the original one.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySpoof;

impl Attack for IdentitySpoof {
    fn kind(&self) -> AttackKind {
        AttackKind::IdentitySpoof
    }

    fn apply(&self, ctx: &mut AttackContext<'_, '_>) -> Result<StepOutcome> {
        let identity = ctx.fake_identity.link_addr();
        let address = ctx.state.assume_identity(identity);
        info!(
            fake_id = %ctx.fake_identity,
            %identity,
            %address,
            "SYA: node pretends to be fake ID"
        );
        Ok(StepOutcome::keep(AttackEffect::IdentitySpoofed { identity, address }))
    }
}

// ----------------------------------------------------------------------------
// DIS Flooding
// ----------------------------------------------------------------------------

/// Multicast one DIS whenever the flood timer has run out
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlFlood;

impl Attack for ControlFlood {
    fn kind(&self) -> AttackKind {
        AttackKind::ControlFlood
    }

    fn apply(&self, ctx: &mut AttackContext<'_, '_>) -> Result<StepOutcome> {
        if !ctx.flood_timer.expired(ctx.now) {
            return Ok(StepOutcome::idle());
        }

        info!("DFA: flooding DIS messages");
        // a failed send still consumes the interval
        ctx.flood_timer.rearm(ctx.now);
        ctx.state.send_control_solicitation(None)?;

        let next_allowed = ctx.now + ctx.flood_timer.interval();
        Ok(StepOutcome::keep(AttackEffect::SolicitationSent { next_allowed }))
    }
}

// ----------------------------------------------------------------------------
// Version Number
// ----------------------------------------------------------------------------

/// Bump the DODAG version by one every cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionTamper;

impl Attack for VersionTamper {
    fn kind(&self) -> AttackKind {
        AttackKind::VersionTamper
    }

    fn apply(&self, ctx: &mut AttackContext<'_, '_>) -> Result<StepOutcome> {
        let (from, to) = ctx
            .state
            .bump_version()
            .ok_or_else(|| AdversaryError::no_topology(self.kind()))?;
        info!(%from, %to, "VNA: new version number");
        Ok(StepOutcome::keep(AttackEffect::VersionBumped { from, to }))
    }
}

// ----------------------------------------------------------------------------
// Sinkhole
// ----------------------------------------------------------------------------

/// Force the advertised rank down to [`Rank::MIN`] every cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct Sinkhole;

impl Attack for Sinkhole {
    fn kind(&self) -> AttackKind {
        AttackKind::Sinkhole
    }

    fn apply(&self, ctx: &mut AttackContext<'_, '_>) -> Result<StepOutcome> {
        let from = ctx
            .state
            .force_rank(Rank::MIN)
            .ok_or_else(|| AdversaryError::no_topology(self.kind()))?;
        info!(
            node = %ctx.state.node_identity(),
            %from,
            to = %Rank::MIN,
            "SHA: modified rank"
        );
        Ok(StepOutcome::keep(AttackEffect::RankForced {
            from,
            to: Rank::MIN,
        }))
    }
}

// ----------------------------------------------------------------------------
// Selective Forwarding
// ----------------------------------------------------------------------------

/// Drop this cycle's payload while still consuming its sequence number
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectiveForwarding;

impl Attack for SelectiveForwarding {
    fn kind(&self) -> AttackKind {
        AttackKind::SelectiveForwarding
    }

    fn apply(&self, ctx: &mut AttackContext<'_, '_>) -> Result<StepOutcome> {
        info!(
            seq = ctx.sequence,
            node = %ctx.state.node_identity(),
            "SFA: dropping packet"
        );
        Ok(StepOutcome::drop(AttackEffect::PacketDropped { seq: ctx.sequence }))
    }
}
