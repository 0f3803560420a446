//! End-to-end scenarios through the public engine API: one-shot static
//! passes, the runtime monitor lifecycle, and certificate pin breaches,
//! all against a scripted platform probe.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trustguard_core::{
    BaselineStore, DeviceTrustEngine, EngineConfig, ResponseHooks, RiskLevel, ScriptedProbe,
    ThreatEvent, ThreatKind,
};

/// Hooks that count every dispatched action class.
#[derive(Default)]
struct CountingHooks {
    terminate: AtomicUsize,
    max_restriction: AtomicUsize,
    abort_network: AtomicUsize,
}

impl ResponseHooks for CountingHooks {
    fn terminate_process(&self, _event: &ThreatEvent) {
        self.terminate.fetch_add(1, Ordering::SeqCst);
    }
    fn activate_maximum_restriction(&self, _event: &ThreatEvent) {
        self.max_restriction.fetch_add(1, Ordering::SeqCst);
    }
    fn abort_network_operation(&self, _event: &ThreatEvent) {
        self.abort_network.fetch_add(1, Ordering::SeqCst);
    }
}

/// A sealed store pinning `api.example.com` to the digest of "good-spki".
fn test_store() -> BaselineStore {
    let mut store = BaselineStore {
        version: "1.0.0".to_string(),
        generated_at: "2026-08-01T00:00:00Z".to_string(),
        signature_sha256: trustguard_core::sha256_hex(b"release-signing-key"),
        resources: BTreeMap::from([(
            "assets/policy.json".to_string(),
            trustguard_core::sha256_hex(b"policy"),
        )]),
        modules: BTreeMap::new(),
        allowed_installers: vec!["com.android.vending".to_string()],
        required_permissions: vec!["android.permission.INTERNET".to_string()],
        pins: BTreeMap::from([(
            "api.example.com".to_string(),
            vec![trustguard_core::sha256_hex(b"good-spki")],
        )]),
        store_hash: String::new(),
    };
    store.seal();
    store
}

fn write_store(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("baseline.json");
    std::fs::write(&path, serde_json::to_string_pretty(&test_store()).unwrap()).unwrap();
    path
}

/// Probe scripted as a pristine device satisfying the test store.
fn pristine_probe() -> Arc<ScriptedProbe> {
    let probe = ScriptedProbe::new();
    probe.set_signature(Some(&trustguard_core::sha256_hex(b"release-signing-key")));
    probe.add_file("assets/policy.json", b"policy");
    probe.set_installer(Some("com.android.vending"));
    probe.add_permission("android.permission.INTERNET");
    Arc::new(probe)
}

struct Harness {
    engine: DeviceTrustEngine,
    probe: Arc<ScriptedProbe>,
    hooks: Arc<CountingHooks>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let probe = pristine_probe();
    let hooks = Arc::new(CountingHooks::default());
    let config = EngineConfig {
        baseline_path: write_store(dir.path()),
        tick_interval: Duration::from_secs(3600),
        ..EngineConfig::default()
    };
    let engine =
        DeviceTrustEngine::initialize_with_hooks(config, probe.clone(), hooks.clone()).unwrap();
    Harness {
        engine,
        probe,
        hooks,
        _dir: dir,
    }
}

#[test]
fn pristine_device_yields_low_risk() {
    let h = harness();
    let report = h.engine.run_static_checks();

    assert_eq!(report.violation_count(), 0);
    assert!(report.is_clean());
    let state = h.engine.trust_state();
    assert_eq!(state.overall_risk, RiskLevel::Low);
    assert_eq!(state.threat_count, 0);
    assert!(state.last_report.is_some());
}

#[test]
fn three_root_indicators_yield_high_risk() {
    let h = harness();
    h.probe.add_path("/system/bin/su");
    h.probe.add_package("com.topjohnwu.magisk");
    h.probe.set_property("ro.debuggable", "1");

    let report = h.engine.run_static_checks();
    assert_eq!(report.violation_count(), 3);
    assert_eq!(h.engine.trust_state().overall_risk, RiskLevel::High);
}

#[test]
fn monitored_debugger_fires_one_event_and_one_terminate() {
    let h = harness();
    h.engine.start_monitoring();
    h.probe.set_debugger_attached(true);
    h.engine.run_monitor_tick();

    let state = h.engine.trust_state();
    assert_eq!(state.threat_count, 1);
    let events = h.engine.recent_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ThreatKind::Debugging);
    assert_eq!(h.hooks.terminate.load(Ordering::SeqCst), 1);
    h.engine.stop_monitoring();
}

#[test]
fn pin_mismatch_is_rejected_and_immediately_critical() {
    let h = harness();
    let attacker_key = {
        let hex = trustguard_core::sha256_hex(b"mitm-spki");
        let mut out = [0u8; 32];
        out.copy_from_slice(&hex::decode(hex).unwrap());
        out
    };

    assert!(!h.engine.validate_certificate("api.example.com", &attacker_key));
    assert_eq!(h.engine.trust_state().overall_risk, RiskLevel::Critical);
    assert_eq!(h.hooks.abort_network.load(Ordering::SeqCst), 1);
    assert_eq!(h.hooks.max_restriction.load(Ordering::SeqCst), 1);
}

#[test]
fn pinned_host_accepts_the_good_key() {
    let h = harness();
    let good_key = {
        let hex = trustguard_core::sha256_hex(b"good-spki");
        let mut out = [0u8; 32];
        out.copy_from_slice(&hex::decode(hex).unwrap());
        out
    };

    assert!(h.engine.validate_certificate("api.example.com", &good_key));
    assert!(h.engine.validate_certificate("unpinned.example.com", &[0u8; 32]));
    assert_eq!(h.engine.trust_state().overall_risk, RiskLevel::Low);
}

#[test]
fn static_violations_and_runtime_threats_share_one_state() {
    let h = harness();
    h.probe.add_path("/system/bin/su");
    h.engine.run_static_checks();
    assert_eq!(h.engine.trust_state().overall_risk, RiskLevel::Medium);

    h.engine.start_monitoring();
    h.probe.add_library("/data/local/tmp/frida-gadget.so");
    for _ in 0..3 {
        h.engine.run_monitor_tick();
    }
    // Runtime risk (3 threats, High) now dominates the static Medium.
    let state = h.engine.trust_state();
    assert_eq!(state.threat_count, 3);
    assert_eq!(state.overall_risk, RiskLevel::High);
    h.engine.stop_monitoring();
}

#[test]
fn detailed_report_reflects_the_last_static_pass() {
    let h = harness();
    h.probe.add_path("/system/bin/su");
    h.engine.run_static_checks();

    let report = h.engine.detailed_report();
    assert!(report.starts_with("=== TrustGuard Report ==="));
    assert!(report.contains("risk: MEDIUM"));
    assert!(report.contains("[FAIL] su-binaries"));
    assert!(report.contains("[PASS] package-signature"));
}

#[test]
fn stop_then_start_begins_a_fresh_session() {
    let h = harness();
    h.engine.start_monitoring();
    h.probe.set_tracer_pid(Some(999));
    h.engine.run_monitor_tick();
    assert_eq!(h.engine.trust_state().threat_count, 1);
    h.engine.stop_monitoring();

    h.probe.set_tracer_pid(None);
    h.engine.start_monitoring();
    let state = h.engine.trust_state();
    assert_eq!(state.threat_count, 0);
    assert_eq!(state.overall_risk, RiskLevel::Low);
    h.engine.stop_monitoring();
}
