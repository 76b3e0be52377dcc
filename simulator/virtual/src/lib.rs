//! RPL Adversary Simulator
//!
//! Deterministic test bench for the adversary node. The simulator plays the
//! rest of the mesh: the RPL protocol engine holding the DODAG, the link
//! identity layer and a root that echoes every datagram back.
//!
//! - **Data-driven scenarios** in TOML: node equipment, DODAG shape, timed
//!   operator steps and final checks
//! - **Discrete-event execution** on a virtual clock, finishing a
//!   ten-minute run in milliseconds
//! - **Live execution** through the tokio runtime with the same scenarios
//!
//! ```toml
//! [metadata]
//! name = "sinkhole"
//! description = "Rank forced to 1 despite engine maintenance"
//!
//! [node]
//! profile = "selective_forwarding"
//!
//! [node.adversary.attacks]
//! sinkhole = true
//!
//! [network]
//! maintenance_interval_seconds = 3.0
//!
//! [run]
//! cycles = 10
//!
//! [[validation.final_checks]]
//! type = "RankEquals"
//! rank = 1
//! ```
//!
//! ```ignore
//! use rpl_adversary_sim::run_scenario_file;
//!
//! let report = run_scenario_file("scenarios/sinkhole.toml".as_ref())?;
//! assert!(report.is_success());
//! ```

use std::path::Path;

pub mod clock;
pub mod executor;
pub mod live;
pub mod network;
pub mod scenario_config;

pub use clock::VirtualClock;
pub use executor::{SimulationExecutor, SimulationReport, StepResult, ValidationResult};
pub use live::{run_live, LiveReport};
pub use network::{
    link_local_address, DodagState, IdentityState, ReplyPath, SimIdentity, SimNetwork,
    SimRoutingEngine, SimTransport, TransportLog,
};
pub use scenario_config::{
    CounterKind, EffectKind, NetworkConfig, MAX_SCENARIO_SECONDS, NodeConfig, RunConfig, ScenarioConfig,
    ScenarioMetadata, TestAction, TestStep, ValidationCheck, ValidationConfig,
};

use rpl_adversary_core::{AdversaryConfig, AttackProfile};

/// Load a scenario file and run it on the discrete-event executor
pub fn run_scenario_file(path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = ScenarioConfig::from_toml_file(path)?;
    Ok(SimulationExecutor::new(scenario)?.run())
}

/// Ad-hoc scenario for one profile and set of attacks, no steps or checks
pub fn create_basic_scenario(
    name: &str,
    profile: AttackProfile,
    adversary: AdversaryConfig,
    run: RunConfig,
) -> ScenarioConfig {
    ScenarioConfig {
        metadata: ScenarioMetadata {
            name: name.to_string(),
            description: format!("Ad-hoc {:?} run", profile),
            version: "1.0".to_string(),
            tags: vec!["adhoc".to_string()],
        },
        node: NodeConfig {
            profile: Some(profile),
            link_addr: None,
            adversary,
        },
        network: NetworkConfig::default(),
        run,
        sequence: Vec::new(),
        validation: ValidationConfig::default(),
    }
}
