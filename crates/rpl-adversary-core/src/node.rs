//! Adversary Node
//!
//! One node session: scheduler, reachability gate, attack controller and
//! transmission engine wired into the per-cycle state machine
//!
//! ```text
//! Idle -> (timer expires) -> Evaluating -> {Sending | Skipping | WaitingForRoot} -> Idle
//! ```
//!
//! The node is purely synchronous. Whoever drives it (the tokio runtime, the
//! discrete-event simulator, a test) owns the clock and the collaborators and
//! calls [`AdversaryNode::poll`] or [`AdversaryNode::run_cycle`].

use core::fmt;
use std::net::Ipv6Addr;

use tracing::{debug, warn};

use crate::config::{AdversaryConfig, AttackFlags, AttackKind, FakeIdentity};
use crate::controller::{AttackController, CycleEffects, Directive};
use crate::errors::Result;
use crate::random::RandomSource;
use crate::routing::{
    IdentityManager, Reachability, ReachabilityGate, RoutingEngine, RoutingStateMutator,
};
use crate::scheduler::{FloodTimer, JitteredScheduler};
use crate::transmission::{Counters, TransmissionEngine};
use crate::transport::DatagramTransport;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// States of one node session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Evaluating,
    Sending,
    Skipping,
    WaitingForRoot,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Evaluating => "evaluating",
            SessionState::Sending => "sending",
            SessionState::Skipping => "skipping",
            SessionState::WaitingForRoot => "waiting_for_root",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Cycle Results
// ----------------------------------------------------------------------------

/// What the cycle did with its transmission slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Sent { seq: u32, root: Ipv6Addr },
    SendFailed { seq: u32, root: Ipv6Addr, reason: String },
    Dropped { seq: u32 },
    Unreachable { missed_counted: bool },
}

/// Everything observable about one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,
    pub at: Timestamp,
    /// Branch taken out of `Evaluating`
    pub branch: SessionState,
    pub outcome: CycleOutcome,
    pub effects: CycleEffects,
    /// Counters logged at the start of the cycle, if a summary was due
    pub summary: Option<Counters>,
    /// Counters after the cycle
    pub counters: Counters,
    pub next_wakeup: Timestamp,
}

impl CycleReport {
    /// Directive of a reachable cycle; `None` when the root was unreachable
    pub fn directive(&self) -> Option<Directive> {
        match self.outcome {
            CycleOutcome::Sent { .. } | CycleOutcome::SendFailed { .. } => Some(Directive::Send),
            CycleOutcome::Dropped { .. } => Some(Directive::Skip),
            CycleOutcome::Unreachable { .. } => None,
        }
    }
}

/// Collaborators borrowed for one cycle
pub struct NodeEnv<'a> {
    pub routing: &'a mut dyn RoutingEngine,
    pub identity: &'a mut dyn IdentityManager,
    pub transport: &'a mut dyn DatagramTransport,
}

// ----------------------------------------------------------------------------
// Adversary Node
// ----------------------------------------------------------------------------

/// A periodic UDP client that misbehaves on request
pub struct AdversaryNode {
    controller: AttackController,
    transmission: TransmissionEngine,
    scheduler: JitteredScheduler,
    gate: ReachabilityGate,
    state: SessionState,
    cycles: u64,
}

impl AdversaryNode {
    /// Create a node from a validated configuration
    pub fn new(config: &AdversaryConfig, random: Box<dyn RandomSource>) -> Result<Self> {
        config.validate()?;

        let controller = AttackController::new(
            config.capabilities,
            config.attacks,
            config.fake_identity,
            FloodTimer::new(config.schedule.flood_interval()),
        )?;

        Ok(Self {
            controller,
            transmission: TransmissionEngine::new(&config.transmission),
            scheduler: JitteredScheduler::new(&config.schedule, random),
            gate: ReachabilityGate,
            state: SessionState::Idle,
            cycles: 0,
        })
    }

    /// Arm the first cycle at a random offset; returns its deadline
    pub fn start(&mut self, now: Timestamp) -> Timestamp {
        let deadline = self.scheduler.start(now);
        debug!(%deadline, "adversary node started");
        deadline
    }

    /// Run a cycle if the cycle timer has expired
    pub fn poll(&mut self, now: Timestamp, env: &mut NodeEnv<'_>) -> Option<CycleReport> {
        if !self.scheduler.expired(now) {
            return None;
        }
        Some(self.run_cycle(now, env))
    }

    /// Run one full cycle and re-arm the cycle timer
    pub fn run_cycle(&mut self, now: Timestamp, env: &mut NodeEnv<'_>) -> CycleReport {
        self.cycles += 1;
        self.transition(SessionState::Evaluating);

        let mut effects = CycleEffects::new();
        let mut summary = None;

        let outcome = match self.gate.check(&*env.routing) {
            Reachability::Unreachable => {
                self.transition(SessionState::WaitingForRoot);
                let missed_counted = self.transmission.record_unreachable();
                self.scheduler.schedule_next(now);
                CycleOutcome::Unreachable { missed_counted }
            }
            Reachability::Reachable { root } => {
                summary = self.transmission.summary_due();

                let sequence = self.transmission.counters().sent;
                let state = RoutingStateMutator::new(&mut *env.routing, &mut *env.identity);
                let (directive, step_effects) = self.controller.apply(now, sequence, state);
                effects = step_effects;

                match directive {
                    Directive::Skip => {
                        self.transition(SessionState::Skipping);
                        let seq = self.transmission.skip();
                        self.scheduler.schedule_after_drop(now);
                        CycleOutcome::Dropped { seq }
                    }
                    Directive::Send => {
                        self.transition(SessionState::Sending);
                        let outcome = match self.transmission.send(&mut *env.transport, root) {
                            Ok(seq) => CycleOutcome::Sent { seq, root },
                            Err(e) => {
                                warn!(seq = sequence, error = %e, "send failed");
                                CycleOutcome::SendFailed {
                                    seq: sequence,
                                    root,
                                    reason: e.to_string(),
                                }
                            }
                        };
                        self.scheduler.schedule_next(now);
                        outcome
                    }
                }
            }
        };

        let branch = self.state;
        self.transition(SessionState::Idle);

        CycleReport {
            cycle: self.cycles,
            at: now,
            branch,
            outcome,
            effects,
            summary,
            counters: self.transmission.counters(),
            next_wakeup: self.scheduler.deadline(),
        }
    }

    /// Receive callback; may run between any two cycles
    pub fn on_receive(&mut self, sender: Ipv6Addr, payload: &[u8]) {
        self.transmission.on_receive(sender, payload);
    }

    /// Toggle one attack between cycles
    pub fn set_attack(&mut self, kind: AttackKind, enabled: bool) -> Result<()> {
        self.controller.set_attack(kind, enabled)
    }

    /// Replace all attack flags between cycles
    pub fn set_flags(&mut self, flags: AttackFlags) -> Result<()> {
        self.controller.set_flags(flags)
    }

    pub fn set_fake_identity(&mut self, id: FakeIdentity) {
        self.controller.set_fake_identity(id);
    }

    pub fn flags(&self) -> AttackFlags {
        self.controller.flags()
    }

    pub fn controller(&self) -> &AttackController {
        &self.controller
    }

    pub fn counters(&self) -> Counters {
        self.transmission.counters()
    }

    pub fn next_wakeup(&self) -> Timestamp {
        self.scheduler.deadline()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}
