//! Engine facade: the host application's single entry point.
//!
//! [`DeviceTrustEngine::initialize`] loads and verifies the baseline trust
//! store, then wires the detectors, the runtime monitor, the certificate
//! validator, and the risk aggregator together. Initialization is
//! fail-fast: a missing, corrupt, or tampered store refuses to construct
//! an engine at all. There is no degraded mode in which the engine runs
//! without its baseline.
//!
//! ## Security Properties
//!
//! - The baseline store's self-integrity digest is verified before any
//!   check consumes it.
//! - Static violations and runtime threats funnel into one aggregator, so
//!   the reported risk level reflects everything observed so far.
//! - A static pass that fails signature or checksum verification raises an
//!   `IntegrityViolation` threat event on top of the report, which fires
//!   the maximum-restriction response.

use std::sync::Arc;

use tracing::info;

use crate::aggregator::{LogOnlyHooks, ResponseHooks, RiskAggregator};
use crate::baseline::BaselineStore;
use crate::checks::root_jailbreak::RootJailbreakDetector;
use crate::checks::static_integrity::StaticIntegrityVerifier;
use crate::config::EngineConfig;
use crate::error::TrustError;
use crate::monitor::RuntimeThreatMonitor;
use crate::pinning::{CertificateTrustValidator, PinSet};
use crate::probe::PlatformProbe;
use crate::types::{CheckCategory, DetectionReport, ThreatEvent, ThreatKind, TrustState};

/// Device trust and runtime self-protection engine.
pub struct DeviceTrustEngine {
    baseline: Arc<BaselineStore>,
    verifier: StaticIntegrityVerifier,
    detector: RootJailbreakDetector,
    monitor: RuntimeThreatMonitor,
    validator: CertificateTrustValidator,
    aggregator: Arc<RiskAggregator>,
}

impl DeviceTrustEngine {
    /// Initialize with the default log-only response hooks.
    ///
    /// # Errors
    ///
    /// Fails fast when the baseline store cannot be loaded and verified.
    pub fn initialize(
        config: EngineConfig,
        probe: Arc<dyn PlatformProbe>,
    ) -> Result<Self, TrustError> {
        Self::initialize_with_hooks(config, probe, Arc::new(LogOnlyHooks))
    }

    /// Initialize with host-supplied response hooks.
    ///
    /// # Errors
    ///
    /// Fails fast when the baseline store cannot be loaded and verified.
    pub fn initialize_with_hooks(
        config: EngineConfig,
        probe: Arc<dyn PlatformProbe>,
        hooks: Arc<dyn ResponseHooks>,
    ) -> Result<Self, TrustError> {
        if config.tick_interval.is_zero() {
            return Err(TrustError::Config {
                message: "tick_interval must be non-zero".to_string(),
            });
        }

        let baseline = Arc::new(BaselineStore::load(&config.baseline_path)?);
        let aggregator = Arc::new(RiskAggregator::new(hooks, config.threat_history_cap));

        let verifier = StaticIntegrityVerifier::new(
            Arc::clone(&baseline),
            Arc::clone(&probe),
            config.allow_sideload,
        );
        let detector = RootJailbreakDetector::new(Arc::clone(&probe), config.command_timeout);
        let monitor = RuntimeThreatMonitor::new(
            Arc::clone(&probe),
            Arc::clone(&aggregator),
            Arc::clone(&baseline),
            config.tick_interval,
        );
        let validator = CertificateTrustValidator::new(
            PinSet::from_baseline(&baseline)?,
            Arc::clone(&aggregator),
        );

        info!(
            version = %baseline.version,
            pinned_hosts = baseline.pins.len(),
            tick_interval_ms = config.tick_interval.as_millis() as u64,
            "device trust engine initialized"
        );

        Ok(Self {
            baseline,
            verifier,
            detector,
            monitor,
            validator,
            aggregator,
        })
    }

    /// Run the full one-shot static pass and ingest the merged report.
    ///
    /// The static-integrity checks and the root/jailbreak checks all run;
    /// the merged report replaces the previous one in the trust state. If
    /// signature or checksum verification failed, one `IntegrityViolation`
    /// threat event is raised on top of the report.
    pub fn run_static_checks(&self) -> DetectionReport {
        let mut report = self.verifier.run_all();
        // Integrity breach is judged on the verifier's checks only; the
        // root detector also emits filesystem-category results, and those
        // carry risk through the violation count, not through this event.
        let integrity_broken =
            report.has_violation_in(&[CheckCategory::Signature, CheckCategory::Filesystem]);
        report.extend(self.detector.run_all());

        self.aggregator.ingest_report(report.clone());
        if integrity_broken {
            self.aggregator.ingest_event(ThreatEvent::now(
                ThreatKind::IntegrityViolation,
                "static-integrity-pass",
            ));
        }
        report
    }

    /// Start the runtime monitor. Idempotent while already monitoring.
    pub fn start_monitoring(&self) {
        self.monitor.start();
    }

    /// Stop the runtime monitor and return to idle. Blocks until no
    /// further tick can fire.
    pub fn stop_monitoring(&self) {
        self.monitor.stop();
    }

    /// Whether the runtime monitor is active.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_monitoring()
    }

    /// Execute one monitor pass synchronously on the caller's thread.
    pub fn run_monitor_tick(&self) {
        self.monitor.run_tick();
    }

    /// Snapshot of the current trust state.
    pub fn trust_state(&self) -> TrustState {
        self.aggregator.trust_state()
    }

    /// Copy of the retained threat history, oldest first.
    pub fn recent_events(&self) -> Vec<ThreatEvent> {
        self.aggregator.recent_events()
    }

    /// Human-readable report of the current trust state.
    pub fn detailed_report(&self) -> String {
        self.aggregator.detailed_report()
    }

    /// Validate a TLS peer's SPKI SHA-256 for `host` against the pins.
    pub fn validate_certificate(&self, host: &str, presented_key_hash: &[u8]) -> bool {
        self.validator.validate(host, presented_key_hash)
    }

    /// Atomically replace the certificate pin set.
    pub fn update_pins(&self, pins: PinSet) {
        self.validator.update_pins(pins);
    }

    /// The verified baseline the engine was initialized from.
    pub fn baseline(&self) -> &BaselineStore {
        &self.baseline
    }
}
