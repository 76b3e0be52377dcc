//! RPL Adversary Scenario Runner
//!
//! Command-line front end of the simulator: run scenario files on the
//! discrete-event executor, run ad-hoc attack mixes, or drive a node in real
//! time through the tokio runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rpl_adversary_core::{AdversaryConfig, AttackKind, AttackProfile};
use rpl_adversary_sim::{
    create_basic_scenario, run_live, LiveReport, RunConfig, ScenarioConfig, SimulationExecutor,
    SimulationReport,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_SCENARIO_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios");

/// RPL Adversary Scenario Runner
#[derive(Parser)]
#[command(name = "rpl-adversary-sim")]
#[command(about = "Deterministic simulation of RPL routing attacks from a single node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a TOML scenario file
    Execute {
        /// Path to TOML scenario file
        scenario_file: PathBuf,
    },
    /// List scenarios in a directory
    List {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Run every scenario in a directory
    All {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Run an ad-hoc attack mix on the virtual clock
    Run {
        /// Capability profile: none, sfa or full
        #[arg(long, default_value = "full")]
        profile: AttackProfile,
        /// Attacks to switch on, e.g. sinkhole,sfa
        #[arg(long, value_delimiter = ',')]
        attacks: Vec<AttackKind>,
        /// Fake ID for the identity spoof
        #[arg(long, default_value_t = 0x2a)]
        fake_id: u8,
        #[arg(long, default_value_t = 10)]
        cycles: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Run an ad-hoc attack mix in real time
    Live {
        #[arg(long, default_value = "full")]
        profile: AttackProfile,
        #[arg(long, value_delimiter = ',')]
        attacks: Vec<AttackKind>,
        #[arg(long, default_value_t = 0x2a)]
        fake_id: u8,
        /// Wall-clock run time
        #[arg(long, default_value_t = 60)]
        seconds: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Execute { scenario_file } => {
            info!("Executing scenario: {}", scenario_file.display());
            execute_scenario_file(&scenario_file)
        }
        Commands::List { dir } => list_scenarios(&scenario_dir(dir)),
        Commands::All { dir } => run_all_scenarios(&scenario_dir(dir)),
        Commands::Run {
            profile,
            attacks,
            fake_id,
            cycles,
            seed,
        } => {
            let adversary = adhoc_config(&attacks, fake_id);
            let run = RunConfig {
                cycles: Some(cycles),
                duration_seconds: None,
                seed,
            };
            let scenario = create_basic_scenario("adhoc", profile, adversary, run);
            let report = SimulationExecutor::new(scenario)?.run();
            print_report(&report);
            exit_on_failure(report.is_success())
        }
        Commands::Live {
            profile,
            attacks,
            fake_id,
            seconds,
            seed,
        } => {
            let adversary = adhoc_config(&attacks, fake_id);
            let run = RunConfig {
                cycles: None,
                duration_seconds: Some(seconds as f64),
                seed,
            };
            let scenario = create_basic_scenario("live", profile, adversary, run);
            let report = run_live(&scenario, Duration::from_secs(seconds)).await?;
            print_live_report(&report);
            Ok(())
        }
    }
}

fn scenario_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| PathBuf::from(DEFAULT_SCENARIO_DIR))
}

fn adhoc_config(attacks: &[AttackKind], fake_id: u8) -> AdversaryConfig {
    attacks
        .iter()
        .fold(AdversaryConfig::default(), |config, kind| {
            config.with_attack(*kind, true)
        })
        .with_fake_identity(fake_id)
}

fn exit_on_failure(success: bool) -> Result<()> {
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute a TOML scenario file
fn execute_scenario_file(scenario_file: &Path) -> Result<()> {
    let scenario = match ScenarioConfig::from_toml_file(scenario_file) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("Scenario load failed: {:#}", e);
            std::process::exit(1);
        }
    };

    let report = SimulationExecutor::new(scenario)?.run();
    print_report(&report);
    exit_on_failure(report.is_success())
}

fn toml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        bail!("no scenarios directory at {}", dir.display());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("toml"))
        .collect();
    files.sort();
    Ok(files)
}

/// List all scenarios in `dir`
fn list_scenarios(dir: &Path) -> Result<()> {
    println!("Available Scenarios:");
    println!("===================");

    for path in toml_files(dir)? {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        match ScenarioConfig::from_toml_file(&path) {
            Ok(scenario) => println!("  {} - {}", name, scenario.metadata.description),
            Err(_) => println!("  {} - (error loading scenario)", name),
        }
    }

    println!();
    println!("Usage:");
    println!("  rpl-adversary-sim execute {}/SCENARIO_NAME.toml", dir.display());
    Ok(())
}

/// Run all scenarios in `dir`
fn run_all_scenarios(dir: &Path) -> Result<()> {
    let files = toml_files(dir)?;
    if files.is_empty() {
        println!("No TOML scenarios found");
        return Ok(());
    }

    println!("Running {} scenarios...", files.len());
    println!();

    let mut passed = 0;
    let mut failed = 0;

    for path in files {
        match ScenarioConfig::from_toml_file(&path)
            .and_then(SimulationExecutor::new)
            .map(SimulationExecutor::run)
        {
            Ok(report) => {
                println!("{}", report.summary());
                if report.is_success() {
                    passed += 1;
                } else {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("ERROR {}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }

    println!();
    println!("Results: {} passed, {} failed", passed, failed);
    exit_on_failure(failed == 0)
}

/// Print a simulation report in a human-readable format
fn print_report(report: &SimulationReport) {
    println!("Scenario Report");
    println!("==================");
    println!("Name: {}", report.scenario_name);
    println!("Version: {}", report.scenario_version);
    println!("Virtual time: {:.1}s", report.duration.as_secs_f64());
    println!("Result: {}", report.summary());
    println!();

    println!("Cycles ({}):", report.cycles.len());
    for cycle in &report.cycles {
        let effects: Vec<String> = cycle.effects.iter().map(|e| format!("{:?}", e)).collect();
        println!(
            "  #{:<3} t={:<8} {:<16} {:?}",
            cycle.cycle,
            cycle.at,
            cycle.branch.to_string(),
            cycle.outcome
        );
        if !effects.is_empty() {
            println!("       {}", effects.join("; "));
        }
    }
    println!();

    if !report.step_results.is_empty() {
        println!("Steps ({}):", report.step_results.len());
        for step in &report.step_results {
            let status = if step.success { "PASS" } else { "FAIL" };
            println!("  {} {} {} at {}", status, step.action, step.name, step.at);
            if let Some(ref error) = step.error {
                println!("     Error: {}", error);
            }
        }
        println!();
    }

    if !report.validation_results.is_empty() {
        println!("Validations ({}):", report.validation_results.len());
        for validation in &report.validation_results {
            let status = if validation.passed { "PASS" } else { "FAIL" };
            println!("  {} {}", status, validation.validation_type);
            if !validation.passed {
                println!("     {}", validation.details);
            }
        }
        println!();
    }

    println!("Network:");
    println!("  {}", report.counters);
    if let Some(topology) = report.dodag.topology {
        println!("  Rank: {}  Version: {}", topology.rank, topology.version);
    }
    println!(
        "  Delivered/lost: {}/{}  DIS: {}  Rank repairs: {}",
        report.dodag.delivered,
        report.dodag.lost,
        report.dodag.solicitations,
        report.dodag.rank_repairs
    );
    println!(
        "  Identity: {} ({})",
        report.identity.link_addr, report.identity.address
    );
}

fn print_live_report(report: &LiveReport) {
    println!("Live Report");
    println!("==================");
    println!("{}", report.summary());
    println!("Flags: {:?}", report.status.flags);
    if let Some(topology) = report.dodag.topology {
        println!("Rank: {}  Version: {}", topology.rank, topology.version);
    }
    println!("DIS sent: {}", report.dodag.solicitations);
    println!(
        "Identity: {} ({})",
        report.identity.link_addr, report.identity.address
    );
}
