//! Risk aggregation and response control.
//!
//! [`RiskAggregator`] is the single owner of [`TrustState`]. The only
//! mutators are [`RiskAggregator::ingest_report`] (after a static pass)
//! and [`RiskAggregator::ingest_event`] (after a monitor tick or pin
//! failure); both serialize through one mutex, so a static-pass ingest and
//! a tick ingest can never interleave partially. Readers always receive a
//! complete snapshot copy.
//!
//! Risk is never hand-set: it is recomputed on every ingest from the
//! current violation count and the running threat count via the fixed
//! boundary law, with one exception: a certificate pin breach latches
//! `Critical` for the remainder of the session. Pin failures are a hard
//! trust breach, not a statistical signal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::types::{
    current_timestamp, DefensiveAction, DetectionReport, RiskLevel, ThreatEvent, ThreatKind,
    TrustState,
};

/// Host-supplied defensive action effects.
///
/// The engine decides *which* action class fires for which threat kind and
/// invokes exactly one callback per action, synchronously, before the
/// ingest that produced it returns. The host owns the actual effect.
/// Default implementations are no-ops so a host overrides only what it
/// handles.
pub trait ResponseHooks: Send + Sync {
    /// DEBUGGING: terminate the process (irrecoverable).
    fn terminate_process(&self, _event: &ThreatEvent) {}
    /// CODE_MODIFICATION: disable sensitive features.
    fn disable_sensitive_features(&self, _event: &ThreatEvent) {}
    /// CODE_INJECTION: purge sensitive in-memory data.
    fn purge_sensitive_data(&self, _event: &ThreatEvent) {}
    /// EMULATION: restrict functionality.
    fn restrict_functionality(&self, _event: &ThreatEvent) {}
    /// HOOKING: restart critical components.
    fn restart_critical_components(&self, _event: &ThreatEvent) {}
    /// MEMORY_TAMPERING: reload security state from the trusted store.
    fn reload_security_state(&self, _event: &ThreatEvent) {}
    /// INTEGRITY_VIOLATION / CERTIFICATE_MISMATCH: maximum restriction.
    fn activate_maximum_restriction(&self, _event: &ThreatEvent) {}
    /// CERTIFICATE_MISMATCH: abort the in-flight network operation.
    fn abort_network_operation(&self, _event: &ThreatEvent) {}
}

/// Hooks that only log. The default when the host registers nothing.
pub struct LogOnlyHooks;

impl ResponseHooks for LogOnlyHooks {
    fn terminate_process(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: terminate-process");
    }
    fn disable_sensitive_features(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: disable-sensitive-features");
    }
    fn purge_sensitive_data(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: purge-sensitive-in-memory-data");
    }
    fn restrict_functionality(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: restrict-functionality");
    }
    fn restart_critical_components(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: restart-critical-components");
    }
    fn reload_security_state(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: reload-security-state");
    }
    fn activate_maximum_restriction(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: activate-maximum-restriction");
    }
    fn abort_network_operation(&self, event: &ThreatEvent) {
        warn!(source = %event.source, "defensive action: abort-network-operation");
    }
}

#[derive(Default)]
struct AggregatorState {
    overall_risk: RiskLevel,
    is_monitoring: bool,
    threat_count: u64,
    last_threat_at: Option<i64>,
    last_report: Option<DetectionReport>,
    static_violations: usize,
    pin_breach: bool,
    history: VecDeque<ThreatEvent>,
}

impl AggregatorState {
    /// Recompute `overall_risk` from the current counts.
    fn recompute(&mut self) {
        let static_risk = RiskLevel::from_violation_count(self.static_violations);
        let runtime_risk = RiskLevel::from_violation_count(self.threat_count as usize);
        let mut risk = static_risk.max(runtime_risk);
        if self.pin_breach {
            risk = RiskLevel::Critical;
        }
        self.overall_risk = risk;
    }
}

/// Single owner of the engine's trust state; dispatches defensive actions.
pub struct RiskAggregator {
    state: Mutex<AggregatorState>,
    hooks: Arc<dyn ResponseHooks>,
    history_cap: usize,
}

impl RiskAggregator {
    /// Create an aggregator with the given response hooks and history cap.
    pub fn new(hooks: Arc<dyn ResponseHooks>, history_cap: usize) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            hooks,
            history_cap: history_cap.max(1),
        }
    }

    /// Ingest the report of a full static pass.
    pub fn ingest_report(&self, report: DetectionReport) {
        let mut state = self.lock();
        state.static_violations = report.violation_count();
        state.last_report = Some(report);
        state.recompute();
        info!(
            violations = state.static_violations,
            risk = %state.overall_risk,
            "static report ingested"
        );
    }

    /// Ingest one threat event and dispatch its defensive actions.
    ///
    /// The state mutation is serialized under the lock; the actions are
    /// invoked after release so a hook may re-enter read paths.
    pub fn ingest_event(&self, event: ThreatEvent) {
        {
            let mut state = self.lock();
            if state.history.len() == self.history_cap {
                state.history.pop_front();
            }
            state.history.push_back(event.clone());
            state.threat_count += 1;
            state.last_threat_at = Some(event.detected_at);
            if event.kind == ThreatKind::CertificateMismatch {
                state.pin_breach = true;
            }
            state.recompute();
            warn!(
                kind = ?event.kind,
                source = %event.source,
                threat_count = state.threat_count,
                risk = %state.overall_risk,
                "threat event ingested"
            );
        }

        self.dispatch(&event);
    }

    /// Begin a monitoring session: reset the session counters.
    pub(crate) fn begin_session(&self) {
        let mut state = self.lock();
        state.is_monitoring = true;
        state.threat_count = 0;
        state.last_threat_at = None;
        state.pin_breach = false;
        state.recompute();
        info!("monitoring session started");
    }

    /// End the monitoring session. Counters are kept for inspection.
    pub(crate) fn end_session(&self) {
        let mut state = self.lock();
        state.is_monitoring = false;
        info!(threats = state.threat_count, "monitoring session stopped");
    }

    /// Snapshot of the current trust state. Never a partial view.
    pub fn trust_state(&self) -> TrustState {
        let state = self.lock();
        TrustState {
            overall_risk: state.overall_risk,
            is_monitoring: state.is_monitoring,
            threat_count: state.threat_count,
            last_threat_at: state.last_threat_at,
            last_report: state.last_report.clone(),
        }
    }

    /// Copy of the retained threat history, oldest first.
    pub fn recent_events(&self) -> Vec<ThreatEvent> {
        self.lock().history.iter().cloned().collect()
    }

    /// Human-readable summary with stable field order: status, risk
    /// level, timestamp, threat counters, per-check pass/fail list.
    pub fn detailed_report(&self) -> String {
        let state = self.lock();
        let mut out = String::new();
        out.push_str("=== TrustGuard Report ===\n");
        out.push_str(&format!(
            "status: {}\n",
            if state.is_monitoring { "monitoring" } else { "idle" }
        ));
        out.push_str(&format!("risk: {}\n", state.overall_risk));
        out.push_str(&format!("generated_at: {}\n", current_timestamp()));
        match state.last_threat_at {
            Some(at) => out.push_str(&format!(
                "threats: {} (last at {})\n",
                state.threat_count, at
            )),
            None => out.push_str(&format!("threats: {}\n", state.threat_count)),
        }
        out.push_str("checks:\n");
        match &state.last_report {
            Some(report) => {
                for result in report.results() {
                    let verdict = if result.passed { "PASS" } else { "FAIL" };
                    match &result.evidence {
                        Some(evidence) => out.push_str(&format!(
                            "  [{verdict}] {} ({}): {evidence}\n",
                            result.check.id, result.check.category
                        )),
                        None => out.push_str(&format!(
                            "  [{verdict}] {} ({})\n",
                            result.check.id, result.check.category
                        )),
                    }
                }
            }
            None => out.push_str("  (no static pass yet)\n"),
        }
        out
    }

    fn dispatch(&self, event: &ThreatEvent) {
        for action in event.kind.actions() {
            match action {
                DefensiveAction::TerminateProcess => self.hooks.terminate_process(event),
                DefensiveAction::DisableSensitiveFeatures => {
                    self.hooks.disable_sensitive_features(event)
                }
                DefensiveAction::PurgeSensitiveData => self.hooks.purge_sensitive_data(event),
                DefensiveAction::RestrictFunctionality => {
                    self.hooks.restrict_functionality(event)
                }
                DefensiveAction::RestartCriticalComponents => {
                    self.hooks.restart_critical_components(event)
                }
                DefensiveAction::ReloadSecurityState => self.hooks.reload_security_state(event),
                DefensiveAction::ActivateMaximumRestriction => {
                    self.hooks.activate_maximum_restriction(event)
                }
                DefensiveAction::AbortNetworkOperation => {
                    self.hooks.abort_network_operation(event)
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        // A poisoned lock means a hookless panic mid-update; recover the
        // data rather than propagate the panic into detector threads.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
