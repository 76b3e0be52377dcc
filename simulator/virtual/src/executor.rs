//! Simulation Executor
//!
//! Deterministic discrete-event run of one adversary node against the
//! in-memory network. Four event sources share a single virtual timeline:
//!
//! - operator steps from the scenario sequence
//! - root replies, delayed by the configured latency
//! - protocol-engine maintenance ticks
//! - the node's own cycle timer
//!
//! Events due at the same instant are handled in that order, so an operator
//! toggle scheduled for the exact wake-up time applies to that cycle, and the
//! engine's rank recomputation precedes the node's own write.

use std::collections::VecDeque;
use std::time::Duration;

use rpl_adversary_core::{
    AdversaryNode, Counters, CycleReport, Datagram, FakeIdentity, LinkAddr,
    NodeEnv, SeededRandom, TimeSource, Timestamp,
};
use tracing::{debug, info};

use crate::clock::VirtualClock;
use crate::network::{
    DodagState, IdentityState, SimIdentity, SimNetwork, SimRoutingEngine, SimTransport,
    TransportLog,
};
use crate::scenario_config::{
    CounterKind, EffectKind, ScenarioConfig, TestAction, TestStep, ValidationCheck,
};

// ----------------------------------------------------------------------------
// Results
// ----------------------------------------------------------------------------

/// Outcome of one operator step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub name: String,
    pub action: String,
    pub at: Timestamp,
    pub success: bool,
    pub error: Option<String>,
}

/// Outcome of one final check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub validation_type: String,
    pub passed: bool,
    pub details: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// Everything observed over one scenario run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub scenario_name: String,
    pub scenario_version: String,
    /// Virtual time covered by the run
    pub duration: Duration,
    pub cycles: Vec<CycleReport>,
    pub counters: Counters,
    pub dodag: DodagState,
    pub identity: IdentityState,
    pub transport: TransportLog,
    pub step_results: Vec<StepResult>,
    pub validation_results: Vec<ValidationResult>,
}

impl SimulationReport {
    pub fn is_success(&self) -> bool {
        self.step_results.iter().all(|step| step.success)
            && self.validation_results.iter().all(|check| check.passed)
    }

    /// Number of recorded effects of one kind across all cycles
    pub fn effect_count(&self, kind: EffectKind) -> u32 {
        let count = self
            .cycles
            .iter()
            .flat_map(|cycle| cycle.effects.iter())
            .filter(|effect| kind.matches(effect))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Payloads that reached the transport
    pub fn datagrams_sent(&self) -> u32 {
        u32::try_from(self.transport.sent.len()).unwrap_or(u32::MAX)
    }

    pub fn summary(&self) -> String {
        if self.is_success() {
            return format!(
                "PASS {} ({:.1}s virtual, {} cycles, {} steps, {} validations) {}",
                self.scenario_name,
                self.duration.as_secs_f64(),
                self.cycles.len(),
                self.step_results.len(),
                self.validation_results.len(),
                self.counters
            );
        }

        let reasons: Vec<String> = self
            .step_results
            .iter()
            .filter(|step| !step.success)
            .map(|step| {
                format!(
                    "step '{}': {}",
                    step.name,
                    step.error.as_deref().unwrap_or("failed")
                )
            })
            .chain(
                self.validation_results
                    .iter()
                    .filter(|check| !check.passed)
                    .map(|check| check.details.clone()),
            )
            .collect();

        format!(
            "FAIL {} ({:.1}s virtual): {}",
            self.scenario_name,
            self.duration.as_secs_f64(),
            reasons.join(", ")
        )
    }
}

// ----------------------------------------------------------------------------
// Executor
// ----------------------------------------------------------------------------

/// Event sources, in same-instant priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Event {
    Step,
    Reply,
    Maintenance,
    Cycle,
}

/// Discrete-event executor for one scenario
pub struct SimulationExecutor {
    scenario: ScenarioConfig,
    clock: VirtualClock,
    network: SimNetwork,
    engine: SimRoutingEngine,
    identity: SimIdentity,
    transport: SimTransport,
    node: AdversaryNode,
    replies: VecDeque<(Timestamp, Datagram)>,
    next_step: usize,
    next_maintenance: Option<Timestamp>,
    cycles: Vec<CycleReport>,
    step_results: Vec<StepResult>,
}

impl SimulationExecutor {
    pub fn new(scenario: ScenarioConfig) -> anyhow::Result<Self> {
        scenario.validate()?;

        let network = SimNetwork::new(&scenario.network);
        let engine = network.engine();
        let transport = network.transport();
        let identity = SimIdentity::new(scenario.node.link_addr()?);
        let node = AdversaryNode::new(
            &scenario.node.resolved(),
            Box::new(SeededRandom::new(scenario.run.seed)),
        )?;
        let next_maintenance = scenario
            .network
            .maintenance_interval()
            .map(|interval| Timestamp::ZERO + interval);

        Ok(Self {
            scenario,
            clock: VirtualClock::new(),
            network,
            engine,
            identity,
            transport,
            node,
            replies: VecDeque::new(),
            next_step: 0,
            next_maintenance,
            cycles: Vec::new(),
            step_results: Vec::new(),
        })
    }

    /// Run until the cycle or time limit is hit and evaluate the final checks
    pub fn run(mut self) -> SimulationReport {
        info!(
            scenario = %self.scenario.metadata.name,
            flags = ?self.node.flags(),
            "simulation started"
        );

        let first = self.node.start(self.clock.now());
        debug!(%first, "first cycle armed");

        let limit = self.scenario.duration().map(|d| Timestamp::ZERO + d);
        let max_cycles = self.scenario.run.cycles;

        loop {
            if max_cycles.is_some_and(|max| self.node.cycles() >= max) {
                break;
            }

            let (at, event) = self.next_event();
            if let Some(limit) = limit.filter(|limit| at > *limit) {
                self.clock.set_time(limit);
                break;
            }

            self.clock.set_time(at);
            match event {
                Event::Step => self.run_step(),
                Event::Reply => self.deliver_reply(),
                Event::Maintenance => self.maintain(),
                Event::Cycle => self.run_cycle(),
            }
        }

        self.finish()
    }

    fn next_event(&self) -> (Timestamp, Event) {
        let mut candidates = vec![(self.node.next_wakeup(), Event::Cycle)];

        if let Some(step) = self.scenario.sequence.get(self.next_step) {
            candidates.push((Timestamp::ZERO + step.at(), Event::Step));
        }
        if let Some((at, _)) = self.replies.front() {
            candidates.push((*at, Event::Reply));
        }
        if let Some(at) = self.next_maintenance {
            candidates.push((at, Event::Maintenance));
        }

        candidates
            .into_iter()
            .min()
            .unwrap_or((self.node.next_wakeup(), Event::Cycle))
    }

    fn run_cycle(&mut self) {
        let now = self.clock.now();
        let mut env = NodeEnv {
            routing: &mut self.engine,
            identity: &mut self.identity,
            transport: &mut self.transport,
        };
        let Some(report) = self.node.poll(now, &mut env) else {
            return;
        };

        let arrival = now + self.scenario.network.reply_latency();
        for reply in self.transport.take_replies() {
            self.replies.push_back((arrival, reply));
        }

        debug!(
            cycle = report.cycle,
            outcome = ?report.outcome,
            next = %report.next_wakeup,
            "cycle complete"
        );
        self.cycles.push(report);
    }

    fn deliver_reply(&mut self) {
        if let Some((_, reply)) = self.replies.pop_front() {
            self.node.on_receive(reply.sender, &reply.payload);
        }
    }

    fn maintain(&mut self) {
        let now = self.clock.now();
        self.network.maintain();
        self.next_maintenance = self
            .scenario
            .network
            .maintenance_interval()
            .map(|interval| now + interval);
    }

    fn run_step(&mut self) {
        let Some(step) = self.scenario.sequence.get(self.next_step).cloned() else {
            return;
        };
        self.next_step += 1;

        let at = self.clock.now();
        let result = self.apply_action(&step);
        info!(step = %step.name, %at, ok = result.is_ok(), "operator step");

        self.step_results.push(StepResult {
            name: step.name.clone(),
            action: action_name(&step.action).to_string(),
            at,
            success: result.is_ok(),
            error: result.err(),
        });
    }

    fn apply_action(&mut self, step: &TestStep) -> Result<(), String> {
        match &step.action {
            TestAction::SetAttack { attack, enabled } => self
                .node
                .set_attack(*attack, *enabled)
                .map_err(|e| e.to_string()),
            TestAction::SetFlags { flags } => {
                self.node.set_flags(*flags).map_err(|e| e.to_string())
            }
            TestAction::SetFakeIdentity { id } => {
                self.node.set_fake_identity(FakeIdentity::new(*id));
                Ok(())
            }
            TestAction::SetReachable { reachable } => {
                self.network.set_reachable(*reachable);
                Ok(())
            }
            TestAction::JoinDodag => {
                self.network.join();
                Ok(())
            }
            TestAction::DetachDodag => {
                self.network.detach();
                Ok(())
            }
            TestAction::GlobalRepair => {
                self.network.global_repair();
                Ok(())
            }
            TestAction::LogCheckpoint { message } => {
                info!(checkpoint = %message, counters = %self.node.counters(), "checkpoint");
                Ok(())
            }
        }
    }

    fn finish(self) -> SimulationReport {
        let mut report = SimulationReport {
            scenario_name: self.scenario.metadata.name.clone(),
            scenario_version: self.scenario.metadata.version.clone(),
            duration: self.clock.current_time(),
            cycles: self.cycles,
            counters: self.node.counters(),
            dodag: self.network.snapshot(),
            identity: self.identity.snapshot(),
            transport: self.transport.snapshot(),
            step_results: self.step_results,
            validation_results: Vec::new(),
        };

        report.validation_results = self
            .scenario
            .validation
            .final_checks
            .iter()
            .map(|check| evaluate(check, &report))
            .collect();

        info!(summary = %report.summary(), "simulation finished");
        report
    }
}

fn action_name(action: &TestAction) -> &'static str {
    match action {
        TestAction::SetAttack { .. } => "SetAttack",
        TestAction::SetFlags { .. } => "SetFlags",
        TestAction::SetFakeIdentity { .. } => "SetFakeIdentity",
        TestAction::SetReachable { .. } => "SetReachable",
        TestAction::JoinDodag => "JoinDodag",
        TestAction::DetachDodag => "DetachDodag",
        TestAction::GlobalRepair => "GlobalRepair",
        TestAction::LogCheckpoint { .. } => "LogCheckpoint",
    }
}

// ----------------------------------------------------------------------------
// Validation
// ----------------------------------------------------------------------------

fn check_range(kind: &str, actual: u32, min: Option<u32>, max: Option<u32>) -> ValidationResult {
    let passed = min.map_or(true, |min| actual >= min) && max.map_or(true, |max| actual <= max);
    let expected = match (min, max) {
        (Some(min), Some(max)) => format!("{}..={}", min, max),
        (Some(min), None) => format!(">= {}", min),
        (None, Some(max)) => format!("<= {}", max),
        (None, None) => "any".to_string(),
    };

    ValidationResult {
        validation_type: kind.to_string(),
        passed,
        details: format!("{} = {} (expected {})", kind, actual, expected),
        expected: Some(expected),
        actual: Some(actual.to_string()),
    }
}

fn check_equal<T: PartialEq + std::fmt::Display>(
    kind: &str,
    expected: T,
    actual: Option<T>,
) -> ValidationResult {
    let actual_text = actual
        .as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string);
    let passed = actual.as_ref() == Some(&expected);

    ValidationResult {
        validation_type: kind.to_string(),
        passed,
        details: format!("{} = {} (expected {})", kind, actual_text, expected),
        expected: Some(expected.to_string()),
        actual: Some(actual_text),
    }
}

fn evaluate(check: &ValidationCheck, report: &SimulationReport) -> ValidationResult {
    let topology = report.dodag.topology;
    match check {
        ValidationCheck::CounterRange { counter, min, max } => {
            let (name, actual) = match counter {
                CounterKind::Sent => ("sent", report.counters.sent),
                CounterKind::Received => ("received", report.counters.received),
                CounterKind::Missed => ("missed", report.counters.missed),
            };
            check_range(name, actual, *min, *max)
        }
        ValidationCheck::DatagramsSent { min, max } => {
            check_range("datagrams_sent", report.datagrams_sent(), *min, *max)
        }
        ValidationCheck::RankEquals { rank } => check_equal(
            "rank",
            *rank,
            topology.map(|topology| topology.rank.value()),
        ),
        ValidationCheck::VersionEquals { version } => check_equal(
            "version",
            *version,
            topology.map(|topology| topology.version.value()),
        ),
        ValidationCheck::IdentityEquals { link_addr } => {
            let actual = report.identity.link_addr;
            match link_addr.parse::<LinkAddr>() {
                Ok(expected) => check_equal("identity", expected, Some(actual)),
                Err(e) => ValidationResult {
                    validation_type: "identity".to_string(),
                    passed: false,
                    details: e.to_string(),
                    expected: Some(link_addr.clone()),
                    actual: Some(actual.to_string()),
                },
            }
        }
        ValidationCheck::SolicitationCount { min, max } => {
            check_range("solicitations", report.dodag.solicitations, *min, *max)
        }
        ValidationCheck::EffectCount { effect, min, max } => {
            let name = format!("{:?}", effect);
            check_range(&name, report.effect_count(*effect), *min, *max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario_config::{
        NetworkConfig, NodeConfig, RunConfig, ScenarioMetadata, ValidationConfig,
    };
    use rpl_adversary_core::{AttackKind, AttackProfile, CycleOutcome};

    fn scenario(node: NodeConfig, run: RunConfig) -> ScenarioConfig {
        ScenarioConfig {
            metadata: ScenarioMetadata {
                name: "unit".to_string(),
                description: "executor unit test".to_string(),
                version: "1.0".to_string(),
                tags: vec![],
            },
            node,
            network: NetworkConfig::default(),
            run,
            sequence: vec![],
            validation: ValidationConfig::default(),
        }
    }

    #[test]
    fn test_benign_run_sends_every_cycle() {
        let report = SimulationExecutor::new(scenario(NodeConfig::default(), RunConfig::default()))
            .unwrap()
            .run();

        assert_eq!(report.cycles.len(), 10);
        assert_eq!(report.counters.sent, 10);
        assert_eq!(report.counters.missed, 0);
        assert_eq!(report.datagrams_sent(), 10);
        assert!(report
            .cycles
            .iter()
            .all(|cycle| matches!(cycle.outcome, CycleOutcome::Sent { .. })));
        // Every reply except possibly the last has arrived
        assert!(report.counters.received >= 9);
        assert!(report.is_success());
    }

    #[test]
    fn test_duration_limit_stops_run() {
        let run = RunConfig {
            cycles: None,
            duration_seconds: Some(35.0),
            seed: 3,
        };
        let report = SimulationExecutor::new(scenario(NodeConfig::default(), run))
            .unwrap()
            .run();

        assert!((2..=4).contains(&report.cycles.len()));
        assert_eq!(report.duration, Duration::from_secs(35));
        assert!(report
            .cycles
            .iter()
            .all(|cycle| cycle.at <= Timestamp::new(35_000)));
    }

    #[test]
    fn test_sinkhole_survives_maintenance() {
        let node = NodeConfig {
            profile: Some(AttackProfile::SelectiveForwarding),
            link_addr: None,
            adversary: rpl_adversary_core::AdversaryConfig::default()
                .with_attack(AttackKind::Sinkhole, true),
        };
        let mut scenario = scenario(node, RunConfig::default());
        scenario.network.maintenance_interval_seconds = Some(3.0);

        let report = SimulationExecutor::new(scenario).unwrap().run();

        assert_eq!(report.dodag.topology.map(|t| t.rank.value()), Some(1));
        assert!(report.dodag.rank_repairs >= 9);
        assert_eq!(report.effect_count(EffectKind::RankForced), 10);
    }

    #[test]
    fn test_failed_validation_reported() {
        let mut scenario = scenario(NodeConfig::default(), RunConfig::default());
        scenario.validation.final_checks = vec![ValidationCheck::CounterRange {
            counter: CounterKind::Missed,
            min: Some(1),
            max: None,
        }];

        let report = SimulationExecutor::new(scenario).unwrap().run();
        assert!(!report.is_success());
        assert!(report.summary().starts_with("FAIL unit"));
        assert_eq!(report.validation_results[0].actual.as_deref(), Some("0"));
    }

    #[test]
    fn test_check_range_bounds() {
        assert!(check_range("sent", 5, Some(5), Some(5)).passed);
        assert!(!check_range("sent", 4, Some(5), None).passed);
        assert!(!check_range("sent", 6, None, Some(5)).passed);
        assert!(check_range("sent", 6, None, None).passed);
    }
}
