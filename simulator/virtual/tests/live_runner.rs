//! Live runs through the tokio runtime on a paused clock

use std::time::Duration;

use rpl_adversary_core::{AdversaryConfig, AttackKind, AttackProfile, FakeIdentity};
use rpl_adversary_sim::{
    create_basic_scenario, run_live, RunConfig, TestAction, TestStep,
};

fn run_config() -> RunConfig {
    RunConfig {
        cycles: None,
        duration_seconds: Some(105.0),
        seed: 11,
    }
}

#[tokio::test(start_paused = true)]
async fn test_live_benign_run() {
    let scenario = create_basic_scenario(
        "live-benign",
        AttackProfile::None,
        AdversaryConfig::default(),
        run_config(),
    );

    let report = run_live(&scenario, Duration::from_secs(105)).await.unwrap();

    let sent = report.transport.sent.len();
    assert!((9..=12).contains(&sent), "unexpected send count {}", sent);
    assert_eq!(report.status.counters.sent as usize, sent);
    assert_eq!(report.status.counters.missed, 0);
    // Echoes come back through the inbound channel
    assert!(report.status.counters.received as usize >= sent - 1);
    assert_eq!(report.cycles.len() as u64, report.status.cycles);
}

#[tokio::test(start_paused = true)]
async fn test_live_steps_reach_the_node() {
    let adversary = AdversaryConfig::default()
        .with_attack(AttackKind::ControlFlood, true)
        .with_fake_identity(0x2a);
    let mut scenario =
        create_basic_scenario("live-attacks", AttackProfile::Full, adversary, run_config());
    scenario.sequence = vec![
        TestStep {
            name: "spoof".to_string(),
            at_time_seconds: 0.0,
            action: TestAction::SetAttack {
                attack: AttackKind::IdentitySpoof,
                enabled: true,
            },
        },
        TestStep {
            name: "new id".to_string(),
            at_time_seconds: 50.0,
            action: TestAction::SetFakeIdentity { id: 0x07 },
        },
        TestStep {
            name: "drop".to_string(),
            at_time_seconds: 60.0,
            action: TestAction::SetAttack {
                attack: AttackKind::SelectiveForwarding,
                enabled: true,
            },
        },
    ];

    let report = run_live(&scenario, Duration::from_secs(105)).await.unwrap();

    assert_eq!(report.identity.link_addr, FakeIdentity::new(0x07).link_addr());
    assert!(report.status.flags.selective_forwarding);
    assert!(report.dodag.solicitations >= 5);
    assert!(report.status.counters.sent as usize > report.transport.sent.len());
}
