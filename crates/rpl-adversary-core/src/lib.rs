//! RPL Adversary Core
//!
//! Attack-injection core for a single misbehaving node in an RPL mesh. The node
//! keeps acting as an ordinary periodic UDP client, but on every transmission
//! cycle an attack controller may corrupt its routing state (rank, DODAG
//! version, link identity) or its data-plane behaviour (drop vs. forward, flood
//! DIS vs. quiescent) before the routine send.
//!
//! The routing protocol engine, the datagram transport, the platform timers and
//! the randomness source are collaborators. This crate only consumes narrow
//! traits from them (see [`routing`], [`transport`], [`types::TimeSource`] and
//! [`random::RandomSource`]) and never reimplements them.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod attacks;
pub mod config;
pub mod controller;
pub mod errors;
pub mod node;
pub mod random;
pub mod routing;
pub mod scheduler;
pub mod transmission;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use attacks::{Attack, AttackContext, AttackEffect, DirectiveModifier, StepOutcome};
pub use config::{
    AdversaryConfig, AttackFlags, AttackKind, AttackProfile, AttackSet, DropRearm,
    FakeIdentity, ScheduleConfig, TransmissionConfig,
};
pub use controller::{AttackController, CycleEffects, Directive};
pub use errors::{AdversaryError, Result};
pub use node::{AdversaryNode, CycleOutcome, CycleReport, NodeEnv, SessionState};
pub use random::{RandomSource, SeededRandom, SystemRandom};
pub use routing::{
    IdentityManager, Reachability, ReachabilityGate, RoutingEngine, RoutingStateMutator, Topology,
};
pub use scheduler::{FloodTimer, JitteredScheduler};
pub use transmission::{Counters, Payload, TransmissionEngine};
pub use transport::DatagramTransport;
pub use types::{Datagram, DagVersion, LinkAddr, Rank, TimeSource, Timestamp};
