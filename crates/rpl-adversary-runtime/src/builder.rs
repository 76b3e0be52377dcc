//! Runtime Builder API
//!
//! Builder-style wiring for consumers (simulator CLI, tests) that want a node
//! running on tokio, plus the handle used to steer it afterwards.

use std::sync::Arc;

use rpl_adversary_core::{
    AdversaryConfig, AdversaryNode, AttackFlags, AttackKind, CycleReport, DatagramTransport,
    FakeIdentity, IdentityManager, RandomSource, RoutingEngine, SeededRandom, SystemRandom,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::info;

use crate::clock::{SimulationClock, SystemClock};
use crate::commands::{
    create_control_channel, create_inbound_channel, ControlCommand, ControlSender, InboundSender,
};
use crate::errors::{RuntimeError, RuntimeResult};
use crate::task::{AdversaryTask, NodeStatus};

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a runtime driving one adversary node
pub struct RuntimeBuilder {
    config: AdversaryConfig,
    clock: Arc<dyn SimulationClock>,
    random: Option<Box<dyn RandomSource>>,
    routing: Option<Box<dyn RoutingEngine>>,
    identity: Option<Box<dyn IdentityManager>>,
    transport: Option<Box<dyn DatagramTransport>>,
    channel_buffer_size: usize,
    cycle_reports: bool,
}

impl RuntimeBuilder {
    pub fn new(config: AdversaryConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            random: None,
            routing: None,
            identity: None,
            transport: None,
            channel_buffer_size: 64,
            cycle_reports: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn SimulationClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Deterministic jitter from a fixed seed
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_random(Box::new(SeededRandom::new(seed)))
    }

    pub fn with_routing(mut self, routing: Box<dyn RoutingEngine>) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_identity(mut self, identity: Box<dyn IdentityManager>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_transport(mut self, transport: Box<dyn DatagramTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set control and inbound channel capacity
    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Stream every `CycleReport` to the handle
    pub fn with_cycle_reports(mut self) -> Self {
        self.cycle_reports = true;
        self
    }

    /// Build the node and spawn its task on the current tokio runtime
    pub async fn build_and_start(self) -> RuntimeResult<RuntimeHandle> {
        let routing = self
            .routing
            .ok_or_else(|| RuntimeError::not_configured("routing engine missing"))?;
        let identity = self
            .identity
            .ok_or_else(|| RuntimeError::not_configured("identity manager missing"))?;
        let transport = self
            .transport
            .ok_or_else(|| RuntimeError::not_configured("datagram transport missing"))?;
        let random = self
            .random
            .unwrap_or_else(|| Box::new(SystemRandom::new()));

        let node = AdversaryNode::new(&self.config, random)?;

        let (control_sender, control_receiver) = create_control_channel(self.channel_buffer_size);
        let (inbound_sender, inbound_receiver) = create_inbound_channel(self.channel_buffer_size);

        let (mut task, status_receiver) = AdversaryTask::new(
            node,
            routing,
            identity,
            transport,
            self.clock,
            control_receiver,
            inbound_receiver,
        );

        let mut report_receiver = None;
        if self.cycle_reports {
            let (sender, receiver) = mpsc::unbounded_channel();
            task = task.with_report_sender(sender);
            report_receiver = Some(receiver);
        }

        let task_handle = tokio::spawn(task.run());
        info!(capabilities = ?self.config.capabilities, "adversary runtime started");

        Ok(RuntimeHandle {
            control_sender,
            inbound_sender,
            status_receiver,
            report_receiver,
            task_handle: Some(task_handle),
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running adversary node
pub struct RuntimeHandle {
    control_sender: ControlSender,
    inbound_sender: InboundSender,
    status_receiver: watch::Receiver<NodeStatus>,
    report_receiver: Option<mpsc::UnboundedReceiver<CycleReport>>,
    task_handle: Option<JoinHandle<RuntimeResult<()>>>,
}

impl RuntimeHandle {
    /// Toggle one attack; applied before the next cycle
    pub async fn set_attack(&self, kind: AttackKind, enabled: bool) -> RuntimeResult<()> {
        let (reply, response) = oneshot::channel();
        self.send_command(ControlCommand::SetAttack {
            kind,
            enabled,
            reply,
        })
        .await?;
        Self::await_reply(response).await
    }

    /// Replace all attack flags; applied before the next cycle
    pub async fn set_flags(&self, flags: AttackFlags) -> RuntimeResult<()> {
        let (reply, response) = oneshot::channel();
        self.send_command(ControlCommand::SetFlags { flags, reply })
            .await?;
        Self::await_reply(response).await
    }

    pub async fn set_fake_identity(&self, id: FakeIdentity) -> RuntimeResult<()> {
        self.send_command(ControlCommand::SetFakeIdentity { id })
            .await
    }

    /// Sender for replies addressed to the node (receive callback input)
    pub fn inbound_sender(&self) -> InboundSender {
        self.inbound_sender.clone()
    }

    /// Latest published status
    pub fn status(&self) -> NodeStatus {
        self.status_receiver.borrow().clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<NodeStatus> {
        self.status_receiver.clone()
    }

    /// Take the cycle report stream (only once, only if enabled on the builder)
    pub fn take_cycle_reports(&mut self) -> Option<mpsc::UnboundedReceiver<CycleReport>> {
        self.report_receiver.take()
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the task to exit on its own
    pub async fn wait(&mut self) -> RuntimeResult<()> {
        match self.task_handle.take() {
            Some(handle) => handle.await.map_err(|e| RuntimeError::TaskFailed {
                reason: e.to_string(),
            })?,
            None => Ok(()),
        }
    }

    /// Stop the node between cycles and wait for the task to finish
    pub async fn shutdown(&mut self) -> RuntimeResult<()> {
        info!("shutting down adversary runtime");
        let _ = self.send_command(ControlCommand::Shutdown).await;

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(joined) => joined.map_err(|e| RuntimeError::TaskFailed {
                    reason: e.to_string(),
                })??,
                Err(_) => {
                    return Err(RuntimeError::TaskFailed {
                        reason: "shutdown timed out".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    async fn send_command(&self, command: ControlCommand) -> RuntimeResult<()> {
        self.control_sender
            .send(command)
            .await
            .map_err(|_| RuntimeError::channel_closed("control"))
    }

    async fn await_reply(
        response: oneshot::Receiver<rpl_adversary_core::Result<()>>,
    ) -> RuntimeResult<()> {
        response
            .await
            .map_err(|_| RuntimeError::channel_closed("command reply"))?
            .map_err(RuntimeError::from)
    }
}
