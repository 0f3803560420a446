//! Runtime threat monitoring (RASP loop).
//!
//! `Idle ⇄ Monitoring`: [`RuntimeThreatMonitor::start`] spins up one
//! polling thread running a fixed-interval tick; [`RuntimeThreatMonitor::stop`]
//! cancels it and joins, so no tick fires after `stop` returns (an
//! in-flight tick finishes but never reschedules). Scheduled ticks and
//! host-triggered sweeps share one tick lock, so two ticks never overlap;
//! an overrunning tick simply defers the next one.
//!
//! Each tick re-runs the cheap checks: debugger, signature re-validation,
//! injection libraries, emulator fingerprints, hooking symbols, and
//! memory-region tampering. Sub-checks are isolated: a panic inside one
//! is logged and the rest of the tick still runs. Every positive
//! detection produces exactly one [`ThreatEvent`] and exactly one
//! synchronous defensive-action dispatch before the tick completes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::aggregator::RiskAggregator;
use crate::baseline::BaselineStore;
use crate::digest::{constant_time_eq, normalize_sha256};
use crate::probe::PlatformProbe;
use crate::types::{ThreatEvent, ThreatKind};

/// Substrings identifying injection tooling in loaded libraries.
const INJECTION_LIBRARY_MARKERS: &[&str] =
    &["frida", "substrate", "libdobby", "libinject", "gadget"];

/// Known hooking-framework method/symbol names.
const HOOKING_SYMBOLS: &[&str] = &[
    "XposedBridge",
    "de.robv.android.xposed",
    "frida_agent_main",
    "MSHookFunction",
    "SubstrateHook",
    "lspd_main",
];

/// Emulator fingerprints: property name → suspicious value substrings.
const EMULATOR_PROPERTIES: &[(&str, &[&str])] = &[
    ("ro.hardware", &["goldfish", "ranchu", "vbox86"]),
    ("ro.product.model", &["sdk", "Emulator", "Android SDK"]),
    ("ro.product.device", &["generic", "vbox86p"]),
    ("ro.kernel.qemu", &["1"]),
];

/// Periodic runtime threat monitor.
pub struct RuntimeThreatMonitor {
    probe: Arc<dyn PlatformProbe>,
    aggregator: Arc<RiskAggregator>,
    baseline: Arc<BaselineStore>,
    interval: Duration,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    // Held for the duration of any tick, scheduled or host-triggered.
    tick_lock: Arc<Mutex<()>>,
}

impl RuntimeThreatMonitor {
    /// Create an idle monitor.
    pub fn new(
        probe: Arc<dyn PlatformProbe>,
        aggregator: Arc<RiskAggregator>,
        baseline: Arc<BaselineStore>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            aggregator,
            baseline,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            tick_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether the poll loop is active.
    pub fn is_monitoring(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the poll loop. Idempotent: a second call while already
    /// monitoring is a no-op and does not reset the session counters.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("start ignored: already monitoring");
            return;
        }

        self.aggregator.begin_session();

        let probe = Arc::clone(&self.probe);
        let aggregator = Arc::clone(&self.aggregator);
        let baseline = Arc::clone(&self.baseline);
        let running = Arc::clone(&self.running);
        let tick_lock = Arc::clone(&self.tick_lock);
        let interval = self.interval;

        let handle = std::thread::Builder::new()
            .name("trustguard-monitor".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "monitor loop running");
                while running.load(Ordering::SeqCst) {
                    // Sleep in slices so stop() stays responsive.
                    let wake = Instant::now() + interval;
                    while running.load(Ordering::SeqCst) && Instant::now() < wake {
                        std::thread::sleep(Duration::from_millis(10).min(interval));
                    }
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let _tick = lock_tick(&tick_lock);
                    run_tick(probe.as_ref(), &aggregator, &baseline);
                }
                info!("monitor loop exited");
            });

        match handle {
            Ok(handle) => {
                *lock_worker(&self.worker) = Some(handle);
            }
            Err(e) => {
                error!(error = %e, "failed to spawn monitor thread");
                self.running.store(false, Ordering::SeqCst);
                self.aggregator.end_session();
            }
        }
    }

    /// Stop the poll loop and return to idle.
    ///
    /// Blocks until the worker has exited: after this returns, no further
    /// tick fires. Calling while idle is a no-op.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = lock_worker(&self.worker).take() {
            let _ = handle.join();
        }
        self.aggregator.end_session();
    }

    /// Execute one monitoring pass synchronously on the caller's thread.
    ///
    /// Host-triggered sweep; also usable while idle. Serialized with the
    /// worker loop and with other sweeps: only one tick ever executes at
    /// a time, a concurrent caller blocks until the in-flight tick ends.
    pub fn run_tick(&self) {
        let _tick = lock_tick(&self.tick_lock);
        run_tick(self.probe.as_ref(), &self.aggregator, &self.baseline);
    }
}

impl Drop for RuntimeThreatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_tick(lock: &Mutex<()>) -> std::sync::MutexGuard<'_, ()> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_worker(
    worker: &Mutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match worker.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One full tick: run every sub-check, isolated, emitting events inline.
fn run_tick(probe: &dyn PlatformProbe, aggregator: &RiskAggregator, baseline: &BaselineStore) {
    let sub_checks: [(&str, &dyn Fn() -> Option<ThreatEvent>); 6] = [
        ("debugger", &|| debugger_check(probe)),
        ("signature", &|| signature_recheck(probe, baseline)),
        ("injection", &|| injection_check(probe)),
        ("emulator", &|| emulator_check(probe)),
        ("hooking", &|| hooking_check(probe)),
        ("memory", &|| memory_check(probe)),
    ];

    for (name, check) in sub_checks {
        // Isolate-and-continue: one failing sub-check must not starve the
        // rest of the tick.
        match catch_unwind(AssertUnwindSafe(check)) {
            Ok(Some(event)) => aggregator.ingest_event(event),
            Ok(None) => {}
            Err(_) => error!(sub_check = name, "sub-check panicked, continuing tick"),
        }
    }
}

fn debugger_check(probe: &dyn PlatformProbe) -> Option<ThreatEvent> {
    if probe.debugger_attached() {
        return Some(ThreatEvent::now(ThreatKind::Debugging, "os debug api"));
    }
    match probe.tracer_pid() {
        Some(pid) if pid != 0 => Some(ThreatEvent::now(
            ThreatKind::Debugging,
            format!("tracer pid {pid}"),
        )),
        _ => None,
    }
}

/// Cheaper subset of the static pass: signature digest only.
fn signature_recheck(probe: &dyn PlatformProbe, baseline: &BaselineStore) -> Option<ThreatEvent> {
    let expected = normalize_sha256(&baseline.signature_sha256)?;
    match probe.signature_sha256().and_then(|s| normalize_sha256(&s)) {
        Some(actual) => {
            if constant_time_eq(expected.as_bytes(), actual.as_bytes()) {
                None
            } else {
                Some(ThreatEvent::now(
                    ThreatKind::CodeModification,
                    "signature digest drift",
                ))
            }
        }
        // Unreadable signature while running is itself a tamper signal.
        None => Some(ThreatEvent::now(
            ThreatKind::CodeModification,
            "signature unreadable",
        )),
    }
}

fn injection_check(probe: &dyn PlatformProbe) -> Option<ThreatEvent> {
    probe.loaded_libraries().into_iter().find_map(|lib| {
        let lower = lib.to_lowercase();
        INJECTION_LIBRARY_MARKERS
            .iter()
            .any(|m| lower.contains(m))
            .then(|| ThreatEvent::now(ThreatKind::CodeInjection, lib))
    })
}

fn emulator_check(probe: &dyn PlatformProbe) -> Option<ThreatEvent> {
    for (property, markers) in EMULATOR_PROPERTIES {
        if let Some(value) = probe.system_property(property) {
            if markers.iter().any(|m| value.contains(m)) {
                return Some(ThreatEvent::now(
                    ThreatKind::Emulation,
                    format!("{property}={value}"),
                ));
            }
        }
    }
    None
}

fn hooking_check(probe: &dyn PlatformProbe) -> Option<ThreatEvent> {
    probe.symbol_table().into_iter().find_map(|symbol| {
        HOOKING_SYMBOLS
            .iter()
            .any(|m| symbol.contains(m))
            .then(|| ThreatEvent::now(ThreatKind::Hooking, symbol))
    })
}

fn memory_check(probe: &dyn PlatformProbe) -> Option<ThreatEvent> {
    probe.memory_regions().into_iter().find_map(|region| {
        let suspicious_wx = region.writable && region.executable && !region.path.is_empty();
        let known_patch = region.path.to_lowercase().contains("frida");
        (suspicious_wx || known_patch).then(|| {
            ThreatEvent::now(
                ThreatKind::MemoryTampering,
                format!("writable+executable mapping {}", region.path),
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::sample_store;
    use crate::probe::{MemoryRegion, ScriptedProbe};
    use crate::testutil::CountingHooks;
    use std::sync::atomic::Ordering as AtomicOrdering;

    struct Fixture {
        probe: Arc<ScriptedProbe>,
        aggregator: Arc<RiskAggregator>,
        hooks: Arc<CountingHooks>,
        monitor: RuntimeThreatMonitor,
    }

    fn fixture(interval: Duration) -> Fixture {
        let baseline = Arc::new(sample_store());
        let probe = Arc::new(ScriptedProbe::new());
        probe.set_signature(Some(&baseline.signature_sha256));
        let hooks = Arc::new(CountingHooks::default());
        let aggregator = Arc::new(RiskAggregator::new(hooks.clone(), 1000));
        let monitor = RuntimeThreatMonitor::new(
            probe.clone() as Arc<dyn PlatformProbe>,
            Arc::clone(&aggregator),
            baseline,
            interval,
        );
        Fixture {
            probe,
            aggregator,
            hooks,
            monitor,
        }
    }

    #[test]
    fn clean_tick_has_no_side_effect() {
        let f = fixture(Duration::from_secs(3600));
        f.monitor.run_tick();
        let state = f.aggregator.trust_state();
        assert_eq!(state.threat_count, 0);
        assert_eq!(f.hooks.terminate.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn debugger_tick_fires_one_event_and_one_action() {
        let f = fixture(Duration::from_secs(3600));
        f.monitor.start();
        f.probe.set_debugger_attached(true);
        f.monitor.run_tick();

        let state = f.aggregator.trust_state();
        assert_eq!(state.threat_count, 1);
        assert_eq!(f.hooks.terminate.load(AtomicOrdering::SeqCst), 1);
        let events = f.aggregator.recent_events();
        assert_eq!(events[0].kind, ThreatKind::Debugging);
        f.monitor.stop();
    }

    #[test]
    fn start_is_idempotent_and_preserves_session_counters() {
        let f = fixture(Duration::from_secs(3600));
        f.monitor.start();
        f.probe.set_tracer_pid(Some(4242));
        f.monitor.run_tick();
        assert_eq!(f.aggregator.trust_state().threat_count, 1);

        // Second start while monitoring: no-op, no reset.
        f.monitor.start();
        assert_eq!(f.aggregator.trust_state().threat_count, 1);

        // Stop + start is a new session.
        f.monitor.stop();
        f.probe.set_tracer_pid(None);
        f.monitor.start();
        assert_eq!(f.aggregator.trust_state().threat_count, 0);
        f.monitor.stop();
    }

    #[test]
    fn no_events_after_stop_even_as_intervals_pass() {
        let f = fixture(Duration::from_millis(10));
        f.probe.set_debugger_attached(true);
        f.monitor.start();
        std::thread::sleep(Duration::from_millis(80));
        f.monitor.stop();

        let count_at_stop = f.aggregator.trust_state().threat_count;
        assert!(count_at_stop >= 1, "loop should have ticked at least once");
        assert!(!f.monitor.is_monitoring());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(f.aggregator.trust_state().threat_count, count_at_stop);
    }

    #[test]
    fn each_threat_kind_detected_from_its_artifact() {
        let f = fixture(Duration::from_secs(3600));
        f.probe.add_library("/data/local/tmp/frida-gadget.so");
        f.probe.set_property("ro.hardware", "ranchu");
        f.probe.add_symbol("de.robv.android.xposed.XposedBridge.main");
        f.probe.add_region(MemoryRegion {
            path: "/system/lib/libart.so".to_string(),
            writable: true,
            executable: true,
        });
        f.monitor.run_tick();

        let kinds: Vec<_> = f
            .aggregator
            .recent_events()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ThreatKind::CodeInjection,
                ThreatKind::Emulation,
                ThreatKind::Hooking,
                ThreatKind::MemoryTampering,
            ]
        );
        assert_eq!(f.hooks.purge.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(f.hooks.restrict.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(f.hooks.restart.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(f.hooks.reload.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn signature_drift_is_code_modification() {
        let f = fixture(Duration::from_secs(3600));
        f.probe
            .set_signature(Some(&crate::digest::sha256_hex(b"patched")));
        f.monitor.run_tick();
        let events = f.aggregator.recent_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ThreatKind::CodeModification);
    }

    #[test]
    fn concurrent_sweeps_never_overlap() {
        use std::sync::atomic::AtomicUsize;

        // Flags any moment at which two ticks probe it simultaneously.
        #[derive(Default)]
        struct OverlapProbe {
            active: AtomicUsize,
            overlapped: std::sync::atomic::AtomicBool,
        }

        impl PlatformProbe for OverlapProbe {
            fn path_exists(&self, _p: &str) -> bool {
                false
            }
            fn read_bytes(&self, p: &str) -> std::io::Result<Vec<u8>> {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, p.to_string()))
            }
            fn package_installed(&self, _p: &str) -> bool {
                false
            }
            fn system_property(&self, _n: &str) -> Option<String> {
                None
            }
            fn loaded_libraries(&self) -> Vec<String> {
                Vec::new()
            }
            fn symbol_table(&self) -> Vec<String> {
                Vec::new()
            }
            fn memory_regions(&self) -> Vec<MemoryRegion> {
                Vec::new()
            }
            fn tracer_pid(&self) -> Option<i32> {
                None
            }
            fn debugger_attached(&self) -> bool {
                if self.active.fetch_add(1, AtomicOrdering::SeqCst) > 0 {
                    self.overlapped.store(true, AtomicOrdering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(5));
                self.active.fetch_sub(1, AtomicOrdering::SeqCst);
                false
            }
            fn selinux_enforcing(&self) -> Option<bool> {
                Some(true)
            }
            fn installer_package(&self) -> Option<String> {
                None
            }
            fn declared_permissions(&self) -> Vec<String> {
                Vec::new()
            }
            fn signature_sha256(&self) -> Option<String> {
                Some(sample_store().signature_sha256)
            }
            fn run_command(&self, _p: &str, _a: &[&str], _t: Duration) -> Option<String> {
                None
            }
        }

        let probe = Arc::new(OverlapProbe::default());
        let aggregator = Arc::new(RiskAggregator::new(
            Arc::new(crate::aggregator::LogOnlyHooks),
            1000,
        ));
        let monitor = Arc::new(RuntimeThreatMonitor::new(
            probe.clone(),
            aggregator,
            Arc::new(sample_store()),
            Duration::from_secs(3600),
        ));

        let sweepers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                std::thread::spawn(move || {
                    for _ in 0..3 {
                        monitor.run_tick();
                    }
                })
            })
            .collect();
        for sweeper in sweepers {
            sweeper.join().unwrap();
        }

        assert!(!probe.overlapped.load(AtomicOrdering::SeqCst));
    }

    #[test]
    fn panicking_sub_check_does_not_abort_the_tick() {
        struct PanickingProbe(Arc<ScriptedProbe>);

        impl PlatformProbe for PanickingProbe {
            fn path_exists(&self, p: &str) -> bool {
                self.0.path_exists(p)
            }
            fn read_bytes(&self, p: &str) -> std::io::Result<Vec<u8>> {
                self.0.read_bytes(p)
            }
            fn package_installed(&self, p: &str) -> bool {
                self.0.package_installed(p)
            }
            fn system_property(&self, n: &str) -> Option<String> {
                self.0.system_property(n)
            }
            fn loaded_libraries(&self) -> Vec<String> {
                self.0.loaded_libraries()
            }
            fn symbol_table(&self) -> Vec<String> {
                self.0.symbol_table()
            }
            fn memory_regions(&self) -> Vec<MemoryRegion> {
                self.0.memory_regions()
            }
            fn tracer_pid(&self) -> Option<i32> {
                self.0.tracer_pid()
            }
            fn debugger_attached(&self) -> bool {
                self.0.debugger_attached()
            }
            fn selinux_enforcing(&self) -> Option<bool> {
                self.0.selinux_enforcing()
            }
            fn installer_package(&self) -> Option<String> {
                self.0.installer_package()
            }
            fn declared_permissions(&self) -> Vec<String> {
                self.0.declared_permissions()
            }
            fn signature_sha256(&self) -> Option<String> {
                panic!("probe backend unavailable");
            }
            fn run_command(&self, p: &str, a: &[&str], t: Duration) -> Option<String> {
                self.0.run_command(p, a, t)
            }
        }

        let baseline = Arc::new(sample_store());
        let scripted = Arc::new(ScriptedProbe::new());
        // A hooking artifact checked after the panicking signature check.
        scripted.add_symbol("MSHookFunction");
        let hooks = Arc::new(CountingHooks::default());
        let aggregator = Arc::new(RiskAggregator::new(hooks.clone(), 1000));
        let monitor = RuntimeThreatMonitor::new(
            Arc::new(PanickingProbe(scripted)),
            Arc::clone(&aggregator),
            baseline,
            Duration::from_secs(3600),
        );

        monitor.run_tick();

        let events = aggregator.recent_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ThreatKind::Hooking);
        assert_eq!(hooks.restart.load(AtomicOrdering::SeqCst), 1);
    }
}
