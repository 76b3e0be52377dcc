//! Data-Driven Scenario Configuration
//!
//! TOML description of one adversary run: how the node is equipped, what the
//! surrounding DODAG looks like, how long to run, which operator actions to
//! take at which virtual time, and what must hold at the end.

use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use rpl_adversary_core::{
    AdversaryConfig, AttackEffect, AttackFlags, AttackKind, AttackProfile, LinkAddr,
};
use serde::{Deserialize, Serialize};

/// Latest virtual time a scenario may name, in seconds (about 136 years)
pub const MAX_SCENARIO_SECONDS: f64 = u32::MAX as f64;

/// Link identity the node boots with unless the scenario names one
pub const DEFAULT_LINK_ADDR: LinkAddr =
    LinkAddr::new([0x00, 0x12, 0x74, 0x01, 0x00, 0x01, 0x01, 0x01]);

// ----------------------------------------------------------------------------
// Core Scenario Configuration
// ----------------------------------------------------------------------------

/// Complete scenario configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub metadata: ScenarioMetadata,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub run: RunConfig,
    /// Operator actions in time order
    #[serde(default)]
    pub sequence: Vec<TestStep>,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub name: String,
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

// ----------------------------------------------------------------------------
// Node Configuration
// ----------------------------------------------------------------------------

/// The adversary node under test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Capability preset; overrides `adversary.capabilities` when set
    #[serde(default)]
    pub profile: Option<AttackProfile>,
    /// Boot-time link identity as hex
    #[serde(default)]
    pub link_addr: Option<String>,
    #[serde(default)]
    pub adversary: AdversaryConfig,
}

impl NodeConfig {
    /// Adversary configuration with the profile applied
    pub fn resolved(&self) -> AdversaryConfig {
        let mut config = self.adversary.clone();
        if let Some(profile) = self.profile {
            config.capabilities = profile.capabilities();
        }
        config
    }

    pub fn link_addr(&self) -> anyhow::Result<LinkAddr> {
        match &self.link_addr {
            Some(text) => Ok(text.parse()?),
            None => Ok(DEFAULT_LINK_ADDR),
        }
    }
}

// ----------------------------------------------------------------------------
// Network Configuration
// ----------------------------------------------------------------------------

/// The DODAG around the node and the root's behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Node has joined the DODAG at start
    pub joined: bool,
    /// Root reachable at start
    pub reachable: bool,
    pub root: Ipv6Addr,
    /// UDP port the root listens on
    pub server_port: u16,
    pub instance_id: u8,
    /// Rank the protocol engine computes for the node
    pub rank: u16,
    pub version: u8,
    /// Period of the engine's rank recomputation; none disables it
    pub maintenance_interval_seconds: Option<f64>,
    /// Root echoes every payload back
    pub server_reply: bool,
    pub reply_latency_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            joined: true,
            reachable: true,
            root: Ipv6Addr::new(0xfd00, 0, 0, 0, 0x0201, 0x0001, 0x0001, 0x0001),
            server_port: 5678,
            instance_id: 30,
            rank: 512,
            version: 240,
            maintenance_interval_seconds: None,
            server_reply: true,
            reply_latency_ms: 50,
        }
    }
}

impl NetworkConfig {
    pub fn maintenance_interval(&self) -> Option<Duration> {
        self.maintenance_interval_seconds.map(Duration::from_secs_f64)
    }

    pub fn reply_latency(&self) -> Duration {
        Duration::from_millis(self.reply_latency_ms)
    }
}

// ----------------------------------------------------------------------------
// Run Configuration
// ----------------------------------------------------------------------------

/// When the run ends; whichever limit is hit first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub cycles: Option<u64>,
    pub duration_seconds: Option<f64>,
    /// Seed of the jitter source
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cycles: Some(10),
            duration_seconds: None,
            seed: 42,
        }
    }
}

// ----------------------------------------------------------------------------
// Test Sequence Definition
// ----------------------------------------------------------------------------

/// A single operator action at a point in virtual time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    pub name: String,
    /// Seconds from scenario start
    pub at_time_seconds: f64,
    #[serde(flatten)]
    pub action: TestAction,
}

impl TestStep {
    pub fn at(&self) -> Duration {
        Duration::from_secs_f64(self.at_time_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum TestAction {
    SetAttack { attack: AttackKind, enabled: bool },
    SetFlags { flags: AttackFlags },
    SetFakeIdentity { id: u8 },
    SetReachable { reachable: bool },
    JoinDodag,
    DetachDodag,
    GlobalRepair,
    LogCheckpoint { message: String },
}

// ----------------------------------------------------------------------------
// Validation Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Checks evaluated when the run ends
    #[serde(default)]
    pub final_checks: Vec<ValidationCheck>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Sent,
    Received,
    Missed,
}

/// Attack effects that can be counted over a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    IdentitySpoofed,
    SolicitationSent,
    VersionBumped,
    RankForced,
    PacketDropped,
    TopologyMissing,
    StepFailed,
}

impl EffectKind {
    pub fn matches(self, effect: &AttackEffect) -> bool {
        matches!(
            (self, effect),
            (EffectKind::IdentitySpoofed, AttackEffect::IdentitySpoofed { .. })
                | (EffectKind::SolicitationSent, AttackEffect::SolicitationSent { .. })
                | (EffectKind::VersionBumped, AttackEffect::VersionBumped { .. })
                | (EffectKind::RankForced, AttackEffect::RankForced { .. })
                | (EffectKind::PacketDropped, AttackEffect::PacketDropped { .. })
                | (EffectKind::TopologyMissing, AttackEffect::TopologyMissing { .. })
                | (EffectKind::StepFailed, AttackEffect::StepFailed { .. })
        )
    }
}

/// Final-state checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValidationCheck {
    CounterRange {
        counter: CounterKind,
        min: Option<u32>,
        max: Option<u32>,
    },
    /// Payloads that actually reached the transport
    DatagramsSent {
        min: Option<u32>,
        max: Option<u32>,
    },
    RankEquals {
        rank: u16,
    },
    VersionEquals {
        version: u8,
    },
    IdentityEquals {
        link_addr: String,
    },
    SolicitationCount {
        min: Option<u32>,
        max: Option<u32>,
    },
    EffectCount {
        effect: EffectKind,
        min: Option<u32>,
        max: Option<u32>,
    },
}

// ----------------------------------------------------------------------------
// Scenario Loading and Utilities
// ----------------------------------------------------------------------------

impl ScenarioConfig {
    /// Load and validate a scenario from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ScenarioConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let adversary = self.node.resolved();
        adversary.validate()?;
        self.node.link_addr()?;

        if self.run.cycles.is_none() && self.run.duration_seconds.is_none() {
            bail!("run needs `cycles` or `duration_seconds`");
        }
        if let Some(seconds) = self.run.duration_seconds {
            check_period("duration_seconds", seconds)?;
        }
        if let Some(seconds) = self.network.maintenance_interval_seconds {
            check_period("maintenance_interval_seconds", seconds)?;
        }

        let mut last_time = 0.0;
        for step in &self.sequence {
            if step.at_time_seconds > MAX_SCENARIO_SECONDS {
                bail!(
                    "step '{}' at time {} is past the {} s limit",
                    step.name,
                    step.at_time_seconds,
                    MAX_SCENARIO_SECONDS
                );
            }
            if !step.at_time_seconds.is_finite() || step.at_time_seconds < last_time {
                bail!(
                    "step '{}' at time {} is out of order (previous step was at {})",
                    step.name,
                    step.at_time_seconds,
                    last_time
                );
            }
            last_time = step.at_time_seconds;

            match &step.action {
                TestAction::SetAttack {
                    attack,
                    enabled: true,
                } if !adversary.capabilities.contains(*attack) => {
                    bail!("step '{}' enables unavailable attack {}", step.name, attack);
                }
                TestAction::SetFlags { flags } => {
                    if let Some(attack) = flags
                        .enabled()
                        .find(|kind| !adversary.capabilities.contains(*kind))
                    {
                        bail!("step '{}' enables unavailable attack {}", step.name, attack);
                    }
                }
                _ => {}
            }
        }

        for check in &self.validation.final_checks {
            if let ValidationCheck::IdentityEquals { link_addr } = check {
                link_addr
                    .parse::<LinkAddr>()
                    .map_err(|e| anyhow!("identity check: {}", e))?;
            }
        }

        Ok(())
    }

    /// Virtual-time limit of the run, if any
    pub fn duration(&self) -> Option<Duration> {
        self.run.duration_seconds.map(Duration::from_secs_f64)
    }
}

/// Positive, finite and no longer than [`MAX_SCENARIO_SECONDS`]
fn check_period(field: &str, seconds: f64) -> anyhow::Result<()> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("{} must be positive, got {}", field, seconds);
    }
    if seconds > MAX_SCENARIO_SECONDS {
        bail!("{} must be at most {} s, got {}", field, MAX_SCENARIO_SECONDS, seconds);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINKHOLE: &str = r#"
[metadata]
name = "sinkhole"
description = "rank forced to the minimum"

[node]
profile = "selective_forwarding"

[node.adversary.attacks]
sinkhole = true

[network]
maintenance_interval_seconds = 3.0

[run]
cycles = 5
seed = 9

[[sequence]]
name = "drop traffic"
at_time_seconds = 20.0
action = "SetAttack"
attack = "selective_forwarding"
enabled = true

[[sequence]]
name = "outage"
at_time_seconds = 30.0
action = "SetReachable"
reachable = false

[[validation.final_checks]]
type = "RankEquals"
rank = 1

[[validation.final_checks]]
type = "CounterRange"
counter = "sent"
min = 4
"#;

    #[test]
    fn test_parse_scenario() {
        let config = ScenarioConfig::from_toml_str(SINKHOLE).unwrap();

        assert_eq!(config.metadata.version, "1.0");
        assert!(config.node.resolved().capabilities.contains(AttackKind::Sinkhole));
        assert!(config.node.resolved().attacks.sinkhole);
        assert_eq!(config.network.rank, 512);
        assert_eq!(
            config.network.maintenance_interval(),
            Some(Duration::from_secs(3))
        );
        assert_eq!(config.run.cycles, Some(5));
        assert_eq!(config.sequence.len(), 2);
        assert_eq!(
            config.sequence[0].action,
            TestAction::SetAttack {
                attack: AttackKind::SelectiveForwarding,
                enabled: true
            }
        );
        assert_eq!(
            config.validation.final_checks[1],
            ValidationCheck::CounterRange {
                counter: CounterKind::Sent,
                min: Some(4),
                max: None
            }
        );
    }

    #[test]
    fn test_unavailable_attack_step_rejected() {
        let toml = SINKHOLE.replace("\"selective_forwarding\"\nenabled", "\"control_flood\"\nenabled");
        let err = ScenarioConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn test_out_of_order_steps_rejected() {
        let toml = SINKHOLE.replace("at_time_seconds = 30.0", "at_time_seconds = 10.0");
        let err = ScenarioConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn test_run_needs_a_limit() {
        let mut config = ScenarioConfig::from_toml_str(SINKHOLE).unwrap();
        config.run.cycles = None;
        assert!(config.validate().is_err());

        config.run.duration_seconds = Some(60.0);
        assert!(config.validate().is_ok());
        assert_eq!(config.duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_effect_kind_matching() {
        let effect = AttackEffect::TopologyMissing {
            attack: AttackKind::Sinkhole,
        };
        assert!(EffectKind::TopologyMissing.matches(&effect));
        assert!(!EffectKind::RankForced.matches(&effect));
    }

    #[test]
    fn test_link_addr_defaults() {
        let node = NodeConfig::default();
        assert_eq!(node.link_addr().unwrap(), DEFAULT_LINK_ADDR);

        let node = NodeConfig {
            link_addr: Some("zz".to_string()),
            ..NodeConfig::default()
        };
        assert!(node.link_addr().is_err());
    }
}
