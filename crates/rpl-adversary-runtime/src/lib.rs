//! RPL Adversary Runtime
//!
//! Drives one [`AdversaryNode`] from a single cooperative tokio task:
//! - `AdversaryTask`: the loop selecting over operator commands, inbound
//!   replies and the cycle timer
//! - `RuntimeBuilder` / `RuntimeHandle`: wiring and control surface
//! - `SimulationClock`: time abstraction so the loop runs on real or paused time
//!
//! Commands and inbound replies are only handled between cycles, which keeps
//! the attack flags stable for the whole of a cycle.

pub mod builder;
pub mod clock;
pub mod commands;
pub mod errors;
pub mod task;

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use clock::{SimulationClock, SystemClock};
pub use commands::{
    create_control_channel, create_inbound_channel, ControlCommand, ControlReceiver,
    ControlSender, InboundReceiver, InboundSender,
};
pub use errors::{RuntimeError, RuntimeResult};
pub use task::{AdversaryTask, NodeStatus};

// Re-export core types for convenience
pub use rpl_adversary_core::{
    AdversaryConfig, AdversaryNode, AttackFlags, AttackKind, AttackProfile, Counters, CycleOutcome,
    CycleReport, Datagram, FakeIdentity,
};
