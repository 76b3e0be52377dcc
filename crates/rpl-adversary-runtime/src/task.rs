//! Adversary Task
//!
//! The single cooperative loop driving one node. Each iteration selects over
//! the control channel, the inbound channel and a sleep until the next cycle
//! deadline; only one of them is handled at a time, so a cycle never overlaps
//! a flag change or a receive callback.

use std::sync::Arc;

use rpl_adversary_core::{
    AdversaryNode, AttackFlags, Counters, CycleOutcome, CycleReport, DatagramTransport,
    FakeIdentity, IdentityManager, NodeEnv, RoutingEngine, SessionState, Timestamp,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::clock::SimulationClock;
use crate::commands::{ControlCommand, ControlReceiver, InboundReceiver};
use crate::errors::RuntimeResult;

// ----------------------------------------------------------------------------
// Node Status
// ----------------------------------------------------------------------------

/// Snapshot of the node published after every cycle and command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub cycles: u64,
    pub state: SessionState,
    pub counters: Counters,
    pub flags: AttackFlags,
    pub fake_identity: FakeIdentity,
    pub next_wakeup: Timestamp,
    pub last_outcome: Option<CycleOutcome>,
}

impl NodeStatus {
    fn of(node: &AdversaryNode, last_outcome: Option<CycleOutcome>) -> Self {
        Self {
            cycles: node.cycles(),
            state: node.state(),
            counters: node.counters(),
            flags: node.flags(),
            fake_identity: node.controller().fake_identity(),
            next_wakeup: node.next_wakeup(),
            last_outcome,
        }
    }
}

// ----------------------------------------------------------------------------
// Adversary Task
// ----------------------------------------------------------------------------

/// Owns the node and its collaborators for the lifetime of the runtime
pub struct AdversaryTask {
    node: AdversaryNode,
    routing: Box<dyn RoutingEngine>,
    identity: Box<dyn IdentityManager>,
    transport: Box<dyn DatagramTransport>,
    clock: Arc<dyn SimulationClock>,
    control_receiver: ControlReceiver,
    inbound_receiver: InboundReceiver,
    status_sender: watch::Sender<NodeStatus>,
    report_sender: Option<mpsc::UnboundedSender<CycleReport>>,
    last_outcome: Option<CycleOutcome>,
    running: bool,
}

impl AdversaryTask {
    /// Create the task and the status channel it publishes on
    pub fn new(
        node: AdversaryNode,
        routing: Box<dyn RoutingEngine>,
        identity: Box<dyn IdentityManager>,
        transport: Box<dyn DatagramTransport>,
        clock: Arc<dyn SimulationClock>,
        control_receiver: ControlReceiver,
        inbound_receiver: InboundReceiver,
    ) -> (Self, watch::Receiver<NodeStatus>) {
        let (status_sender, status_receiver) = watch::channel(NodeStatus::of(&node, None));
        let task = Self {
            node,
            routing,
            identity,
            transport,
            clock,
            control_receiver,
            inbound_receiver,
            status_sender,
            report_sender: None,
            last_outcome: None,
            running: true,
        };
        (task, status_receiver)
    }

    /// Forward every cycle report to `sender`
    pub fn with_report_sender(mut self, sender: mpsc::UnboundedSender<CycleReport>) -> Self {
        self.report_sender = Some(sender);
        self
    }

    /// Run until shutdown or until the control channel closes
    pub async fn run(mut self) -> RuntimeResult<()> {
        let first = self.node.start(self.clock.now());
        info!(first_cycle = %first, flags = ?self.node.flags(), "adversary task starting");
        self.publish_status();

        while self.running {
            let wait = self.node.next_wakeup().saturating_duration_since(self.clock.now());

            tokio::select! {
                biased;

                command = self.control_receiver.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("control channel closed, shutting down");
                        self.running = false;
                    }
                },

                Some(datagram) = self.inbound_receiver.recv() => {
                    self.node.on_receive(datagram.sender, &datagram.payload);
                    self.publish_status();
                }

                _ = self.clock.sleep(wait) => self.run_cycle(),
            }
        }

        info!(counters = %self.node.counters(), "adversary task stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: ControlCommand) {
        debug!(?command, "control command");
        match command {
            ControlCommand::SetAttack {
                kind,
                enabled,
                reply,
            } => {
                let result = self.node.set_attack(kind, enabled);
                match &result {
                    Ok(()) => info!(attack = kind.tag(), enabled, "attack toggled"),
                    Err(e) => warn!(attack = kind.tag(), error = %e, "attack toggle rejected"),
                }
                let _ = reply.send(result);
            }
            ControlCommand::SetFlags { flags, reply } => {
                let result = self.node.set_flags(flags);
                if let Err(e) = &result {
                    warn!(error = %e, "flag update rejected");
                }
                let _ = reply.send(result);
            }
            ControlCommand::SetFakeIdentity { id } => {
                info!(fake_id = %id, "fake identity updated");
                self.node.set_fake_identity(id);
            }
            ControlCommand::Shutdown => {
                info!("shutdown requested");
                self.running = false;
            }
        }
        self.publish_status();
    }

    fn run_cycle(&mut self) {
        let now = self.clock.now();
        let mut env = NodeEnv {
            routing: self.routing.as_mut(),
            identity: self.identity.as_mut(),
            transport: self.transport.as_mut(),
        };

        // woke marginally early; the next iteration sleeps the remainder
        let Some(report) = self.node.poll(now, &mut env) else {
            return;
        };

        self.last_outcome = Some(report.outcome.clone());
        self.publish_status();

        if let Some(sender) = &self.report_sender {
            if sender.send(report).is_err() {
                debug!("cycle report receiver dropped");
                self.report_sender = None;
            }
        }
    }

    fn publish_status(&self) {
        self.status_sender
            .send_replace(NodeStatus::of(&self.node, self.last_outcome.clone()));
    }
}
