//! Operator commands and inbound datagrams
//!
//! Both reach the adversary task over bounded mpsc channels and are drained
//! between cycles only.

use core::fmt;

use rpl_adversary_core::{AttackFlags, AttackKind, Datagram, FakeIdentity, Result};
use tokio::sync::{mpsc, oneshot};

/// Reply slot for commands that can be rejected
pub type CommandReply = oneshot::Sender<Result<()>>;

/// Single-writer control surface of a running node
pub enum ControlCommand {
    SetAttack {
        kind: AttackKind,
        enabled: bool,
        reply: CommandReply,
    },
    SetFlags {
        flags: AttackFlags,
        reply: CommandReply,
    },
    SetFakeIdentity {
        id: FakeIdentity,
    },
    Shutdown,
}

impl fmt::Debug for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::SetAttack { kind, enabled, .. } => f
                .debug_struct("SetAttack")
                .field("kind", kind)
                .field("enabled", enabled)
                .finish(),
            ControlCommand::SetFlags { flags, .. } => {
                f.debug_struct("SetFlags").field("flags", flags).finish()
            }
            ControlCommand::SetFakeIdentity { id } => {
                f.debug_struct("SetFakeIdentity").field("id", id).finish()
            }
            ControlCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

pub type ControlSender = mpsc::Sender<ControlCommand>;
pub type ControlReceiver = mpsc::Receiver<ControlCommand>;
pub type InboundSender = mpsc::Sender<Datagram>;
pub type InboundReceiver = mpsc::Receiver<Datagram>;

pub fn create_control_channel(buffer: usize) -> (ControlSender, ControlReceiver) {
    mpsc::channel(buffer.max(1))
}

pub fn create_inbound_channel(buffer: usize) -> (InboundSender, InboundReceiver) {
    mpsc::channel(buffer.max(1))
}
