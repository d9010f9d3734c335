//! End-to-end scrape cycles against scripted devices

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::{Duration, Instant};

use upssrv::api::exposition::encode_text;
use upssrv::core::family::{CoreKey, Direction, PhaseKey};
use upssrv::core::transport::{MockClient, MockDevice};
use upssrv::{
    resolve_targets, Catalogue, Coordinator, FamilyRegistry, Measurement, MetricKind,
    RegisterMap, ScrapeResult, ScrapeSettings, TargetConfig, TargetDefaults,
};

fn defaults(family: &str) -> TargetDefaults {
    TargetDefaults {
        community: "public".into(),
        family: family.into(),
    }
}

fn coordinator(
    client: MockClient,
    inline: &str,
    configured: &[TargetConfig],
    family: &str,
    settings: ScrapeSettings,
) -> Coordinator {
    let registry = FamilyRegistry::builtin();
    let targets = resolve_targets(inline, configured, &defaults(family), &registry).unwrap();
    Coordinator::new(
        Arc::new(client),
        Arc::new(Catalogue::default()),
        targets,
        settings,
    )
}

fn for_target<'a>(result: &'a ScrapeResult, target: &str) -> Vec<&'a Measurement> {
    result
        .measurements
        .iter()
        .filter(|m| m.target() == target)
        .collect()
}

fn value(result: &ScrapeResult, kind: MetricKind, labels: &[&str]) -> Option<f64> {
    result
        .measurements
        .iter()
        .find(|m| {
            m.kind == kind && m.labels.iter().map(String::as_str).eq(labels.iter().copied())
        })
        .map(|m| m.value)
}

/// Single-phase MGE unit: charge 87 %, 230 V in, 50 % load
fn single_phase_mge(raw_power: i64) -> MockDevice {
    let map = RegisterMap::mge();
    MockDevice::new()
        .with_core(&map, CoreKey::BatteryCharge, 87)
        .with_core(&map, CoreKey::InputPhases, 1)
        .with_core(&map, CoreKey::OutputPhases, 1)
        .with_core(&map, CoreKey::RawOutputPower, raw_power)
        .with_phase(&map, Direction::Input, PhaseKey::Voltage, 1, 230)
        .with_phase(&map, Direction::Output, PhaseKey::Voltage, 1, 230)
        .with_phase(&map, Direction::Output, PhaseKey::Load, 1, 50)
}

#[tokio::test]
async fn scenario_a_healthy_single_phase_target() {
    let client = MockClient::new().with_device("10.0.0.1", single_phase_mge(1_000));
    let result = coordinator(client, "10.0.0.1", &[], "mge", ScrapeSettings::default())
        .scrape()
        .await;

    assert_eq!(value(&result, MetricKind::BatteryCharge, &["10.0.0.1"]), Some(87.0));
    assert_eq!(
        value(&result, MetricKind::InputVoltage, &["10.0.0.1", "1"]),
        Some(230.0)
    );
    assert_eq!(
        value(&result, MetricKind::OutputPower, &["10.0.0.1", "1"]),
        Some(500.0)
    );
    assert_eq!(value(&result, MetricKind::Up, &["10.0.0.1"]), Some(1.0));

    let text = encode_text(&Catalogue::default(), &result.measurements).unwrap();
    assert!(text.contains("eaton_usv_battery_charge{target=\"10.0.0.1\"} 87"));
    assert!(text.contains("eaton_usv_input_voltage{target=\"10.0.0.1\",phase=\"1\"} 230"));
    assert!(text.contains("eaton_usv_output_power{target=\"10.0.0.1\",phase=\"1\"} 500"));
    assert!(text.contains("eaton_usv_up{target=\"10.0.0.1\"} 1"));
}

#[tokio::test]
async fn power_truncates_before_multiplying() {
    for (raw, load, expected) in [(100_000, 50, 50_000.0), (99, 80, 0.0), (12_345, 0, 0.0), (199, 3, 3.0)] {
        let map = RegisterMap::mge();
        let device = single_phase_mge(raw).with_phase(&map, Direction::Output, PhaseKey::Load, 1, load);
        let client = MockClient::new().with_device("ups", device);
        let result = coordinator(client, "ups", &[], "mge", ScrapeSettings::default())
            .scrape()
            .await;
        assert_eq!(
            value(&result, MetricKind::OutputPower, &["ups", "1"]),
            Some(expected),
            "raw={} load={}",
            raw,
            load
        );
    }
}

#[tokio::test]
async fn scenario_b_unreachable_target_reports_only_up_zero() {
    let client = MockClient::new().with_device("10.0.0.9", MockDevice::unreachable("refused"));
    let result = coordinator(client, "10.0.0.9", &[], "xups", ScrapeSettings::default())
        .scrape()
        .await;

    let samples = for_target(&result, "10.0.0.9");
    assert_eq!(samples, vec![&Measurement::up("10.0.0.9", false)]);

    let text = encode_text(&Catalogue::default(), &result.measurements).unwrap();
    assert!(text.contains("eaton_usv_up{target=\"10.0.0.9\"} 0"));
    assert_eq!(text.lines().filter(|l| !l.starts_with('#')).count(), 1);
}

#[tokio::test]
async fn scenario_c_merged_targets_with_duplicate() {
    let client = MockClient::new()
        .with_device("10.0.0.1", single_phase_mge(1_000))
        .with_device("10.0.0.2", MockDevice::unreachable("refused"));
    let configured = vec![
        TargetConfig::Address("10.0.0.1".into()),
        TargetConfig::Address("  ".into()),
    ];
    let coordinator = coordinator(
        client.clone(),
        "10.0.0.1,,10.0.0.2",
        &configured,
        "mge",
        ScrapeSettings::default(),
    );
    assert_eq!(coordinator.targets().len(), 3);

    let result = coordinator.scrape().await;
    assert_eq!(result.reachable, 2);
    assert_eq!(result.unreachable, 1);

    let ups: Vec<_> = result
        .measurements
        .iter()
        .filter(|m| m.kind == MetricKind::Up)
        .map(|m| (m.target(), m.value))
        .collect();
    assert_eq!(ups.len(), 3);
    assert_eq!(ups.iter().filter(|(t, v)| *t == "10.0.0.1" && *v == 1.0).count(), 2);
    assert_eq!(ups.iter().filter(|(t, v)| *t == "10.0.0.2" && *v == 0.0).count(), 1);

    // each occurrence was polled on its own session
    assert_eq!(client.sessions_opened(), 2);
    assert_eq!(
        result
            .measurements
            .iter()
            .filter(|m| m.kind == MetricKind::BatteryCharge)
            .count(),
        2
    );
}

#[tokio::test]
async fn slow_target_does_not_hold_back_the_others() {
    let client = MockClient::new()
        .with_device("fast-1", single_phase_mge(1_000))
        .with_device("fast-2", single_phase_mge(2_000))
        .with_device("stuck", MockDevice::new().hanging());
    let settings = ScrapeSettings {
        session_timeout: Duration::from_millis(150),
        scrape_timeout: Some(Duration::from_secs(5)),
    };

    let started = Instant::now();
    let result = coordinator(client, "stuck,fast-1,fast-2", &[], "mge", settings)
        .scrape()
        .await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(value(&result, MetricKind::Up, &["stuck"]), Some(0.0));
    assert_eq!(for_target(&result, "stuck").len(), 1);
    assert_eq!(value(&result, MetricKind::Up, &["fast-1"]), Some(1.0));
    assert_eq!(value(&result, MetricKind::Up, &["fast-2"]), Some(1.0));
    assert_eq!(
        value(&result, MetricKind::OutputPower, &["fast-2", "1"]),
        Some(1_000.0)
    );
}

#[tokio::test]
async fn phase_counts_match_advertised_rows() {
    let map = RegisterMap::mge();
    let mut device = MockDevice::new()
        .with_core(&map, CoreKey::InputPhases, 3)
        .with_core(&map, CoreKey::OutputPhases, 3);
    for phase in 1..=3 {
        device = device
            .with_phase(&map, Direction::Input, PhaseKey::Voltage, phase, 230)
            .with_phase(&map, Direction::Output, PhaseKey::Voltage, phase, 231);
    }
    let failing = device.clone().failing_phase(&map, Direction::Input, 3);
    let client = MockClient::new()
        .with_device("full", device)
        .with_device("cut", failing);

    let result = coordinator(client, "full,cut", &[], "mge", ScrapeSettings::default())
        .scrape()
        .await;
    assert_eq!(result.partial, 1);

    let phases = |target: &str, kind: MetricKind| -> Vec<String> {
        let mut phases: Vec<_> = result
            .measurements
            .iter()
            .filter(|m| m.target() == target && m.kind == kind)
            .map(|m| m.labels[1].clone())
            .collect();
        phases.sort();
        phases
    };
    assert_eq!(phases("full", MetricKind::InputVoltage), vec!["1", "2", "3"]);
    assert_eq!(phases("cut", MetricKind::InputVoltage), vec!["1", "2"]);
    assert_eq!(phases("cut", MetricKind::OutputVoltage), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn per_target_family_and_auto_detection() {
    let xups = RegisterMap::xups();
    let client = MockClient::new()
        .with_device("mge-unit", single_phase_mge(1_000))
        .with_device(
            "xups-unit",
            MockDevice::new()
                .with_core(&xups, CoreKey::BatteryCharge, 64)
                .with_core(&xups, CoreKey::OutputSource, 5),
        );
    let configured = vec![TargetConfig::Detailed {
        address: "xups-unit".into(),
        community: None,
        family: Some("xups".into()),
    }];

    let result = coordinator(client, "mge-unit", &configured, "auto", ScrapeSettings::default())
        .scrape()
        .await;
    assert_eq!(value(&result, MetricKind::BatteryCharge, &["mge-unit"]), Some(87.0));
    assert_eq!(value(&result, MetricKind::BatteryCharge, &["xups-unit"]), Some(64.0));
    assert_eq!(value(&result, MetricKind::OnBattery, &["xups-unit"]), Some(1.0));
}
