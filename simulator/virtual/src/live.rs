//! Live Runner
//!
//! Runs a scenario through the tokio runtime instead of the discrete-event
//! executor. The node lives in its own task; root echoes travel back over
//! the runtime's inbound channel after the configured latency, operator
//! steps go through the runtime handle, and engine maintenance runs on its
//! own interval.
//!
//! Under a paused tokio clock this is as deterministic as the executor, but
//! it exercises the real command and receive paths.

use std::time::Duration;

use anyhow::Context;
use rpl_adversary_core::{CycleReport, Datagram, FakeIdentity, SeededRandom};
use rpl_adversary_runtime::{NodeStatus, RuntimeBuilder, RuntimeHandle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::network::{DodagState, IdentityState, ReplyPath, SimIdentity, SimNetwork, TransportLog};
use crate::scenario_config::{ScenarioConfig, TestAction};

/// State observed at the end of a live run
#[derive(Debug, Clone)]
pub struct LiveReport {
    pub scenario_name: String,
    pub status: NodeStatus,
    pub cycles: Vec<CycleReport>,
    pub dodag: DodagState,
    pub identity: IdentityState,
    pub transport: TransportLog,
}

impl LiveReport {
    pub fn summary(&self) -> String {
        format!(
            "LIVE {} ({} cycles, {} datagrams) {}",
            self.scenario_name,
            self.status.cycles,
            self.transport.sent.len(),
            self.status.counters
        )
    }
}

/// Run `scenario` on the tokio runtime for `duration`
pub async fn run_live(scenario: &ScenarioConfig, duration: Duration) -> anyhow::Result<LiveReport> {
    scenario.validate()?;

    let network = SimNetwork::new(&scenario.network);
    let identity = SimIdentity::new(scenario.node.link_addr()?);

    let (reply_sender, reply_receiver) = mpsc::unbounded_channel();
    let reply_path = if scenario.network.server_reply {
        ReplyPath::Channel(reply_sender)
    } else {
        ReplyPath::Disabled
    };
    let transport = network.transport().with_reply_path(reply_path);

    let mut handle = RuntimeBuilder::new(scenario.node.resolved())
        .with_random(Box::new(SeededRandom::new(scenario.run.seed)))
        .with_routing(Box::new(network.engine()))
        .with_identity(Box::new(identity.clone()))
        .with_transport(Box::new(transport.clone()))
        .with_cycle_reports()
        .build_and_start()
        .await
        .context("failed to start adversary runtime")?;
    let mut reports = handle.take_cycle_reports();

    let forwarder = spawn_reply_forwarder(
        &handle,
        reply_receiver,
        scenario.network.reply_latency(),
    );
    let maintenance = scenario
        .network
        .maintenance_interval()
        .map(|interval| spawn_maintenance(network.clone(), interval));

    let start = Instant::now();
    for step in &scenario.sequence {
        if step.at() > duration {
            break;
        }
        tokio::time::sleep_until(start + step.at()).await;
        if let Err(e) = apply_step(&handle, &network, &step.action).await {
            warn!(step = %step.name, error = %e, "operator step failed");
        }
    }
    tokio::time::sleep_until(start + duration).await;

    handle.shutdown().await?;
    let status = handle.status();
    forwarder.abort();
    if let Some(maintenance) = maintenance {
        maintenance.abort();
    }

    let mut cycles = Vec::new();
    if let Some(receiver) = reports.as_mut() {
        while let Ok(report) = receiver.try_recv() {
            cycles.push(report);
        }
    }

    let report = LiveReport {
        scenario_name: scenario.metadata.name.clone(),
        status,
        cycles,
        dodag: network.snapshot(),
        identity: identity.snapshot(),
        transport: transport.snapshot(),
    };
    info!(summary = %report.summary(), "live run finished");
    Ok(report)
}

async fn apply_step(
    handle: &RuntimeHandle,
    network: &SimNetwork,
    action: &TestAction,
) -> anyhow::Result<()> {
    match action {
        TestAction::SetAttack { attack, enabled } => handle.set_attack(*attack, *enabled).await?,
        TestAction::SetFlags { flags } => handle.set_flags(*flags).await?,
        TestAction::SetFakeIdentity { id } => {
            handle.set_fake_identity(FakeIdentity::new(*id)).await?
        }
        TestAction::SetReachable { reachable } => network.set_reachable(*reachable),
        TestAction::JoinDodag => network.join(),
        TestAction::DetachDodag => network.detach(),
        TestAction::GlobalRepair => network.global_repair(),
        TestAction::LogCheckpoint { message } => {
            info!(checkpoint = %message, counters = %handle.status().counters, "checkpoint")
        }
    }
    Ok(())
}

/// Deliver root echoes to the node after `latency`
fn spawn_reply_forwarder(
    handle: &RuntimeHandle,
    mut replies: mpsc::UnboundedReceiver<Datagram>,
    latency: Duration,
) -> JoinHandle<()> {
    let inbound = handle.inbound_sender();
    tokio::spawn(async move {
        while let Some(reply) = replies.recv().await {
            tokio::time::sleep(latency).await;
            if inbound.send(reply).await.is_err() {
                break;
            }
        }
    })
}

fn spawn_maintenance(network: SimNetwork, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            network.maintain();
        }
    })
}
