//! Check registration and execution.
//!
//! Detectors register closures against a [`Check`] identity at
//! construction time and run them as one ordered pass. Nothing
//! short-circuits: every registered check always runs, so a report always
//! carries full evidence. An execution failure inside a check is a
//! violation, never a skip (fail-closed).

pub mod root_jailbreak;
pub mod static_integrity;

use tracing::{debug, warn};

use crate::probe::PlatformProbe;
use crate::types::{Check, CheckResult, DetectionReport};

pub use root_jailbreak::RootJailbreakDetector;
pub use static_integrity::StaticIntegrityVerifier;

/// Outcome of evaluating one check body.
pub enum CheckOutcome {
    /// Nothing suspicious observed.
    Pass,
    /// A violation, with evidence.
    Violation(String),
    /// The check could not complete. Treated as a violation.
    Error(String),
}

type CheckFn = Box<dyn Fn(&dyn PlatformProbe) -> CheckOutcome + Send + Sync>;

/// Ordered list of registered checks.
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<(Check, CheckFn)>,
}

impl CheckSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check. Execution order follows registration order.
    pub fn register<F>(&mut self, check: Check, body: F)
    where
        F: Fn(&dyn PlatformProbe) -> CheckOutcome + Send + Sync + 'static,
    {
        self.checks.push((check, Box::new(body)));
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every registered check, in order, against the probe.
    pub fn run_all(&self, probe: &dyn PlatformProbe) -> DetectionReport {
        let mut report = DetectionReport::new();
        for (check, body) in &self.checks {
            let result = match body(probe) {
                CheckOutcome::Pass => {
                    debug!(check = %check.id, "check passed");
                    CheckResult::pass(check.clone())
                }
                CheckOutcome::Violation(evidence) => {
                    warn!(check = %check.id, evidence = %evidence, "check violation");
                    CheckResult::fail(check.clone(), evidence)
                }
                CheckOutcome::Error(reason) => {
                    warn!(check = %check.id, reason = %reason, "check could not complete, failing closed");
                    CheckResult::fail(check.clone(), format!("check execution failed: {reason}"))
                }
            };
            report.push(result);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ScriptedProbe;
    use crate::types::CheckCategory;

    #[test]
    fn run_all_preserves_order_and_fails_closed() {
        let mut set = CheckSet::new();
        set.register(Check::new("first", CheckCategory::Filesystem), |_| {
            CheckOutcome::Pass
        });
        set.register(Check::new("second", CheckCategory::Package), |_| {
            CheckOutcome::Violation("marker".to_string())
        });
        set.register(Check::new("third", CheckCategory::Property), |_| {
            CheckOutcome::Error("probe unavailable".to_string())
        });

        let probe = ScriptedProbe::new();
        let report = set.run_all(&probe);

        let ids: Vec<_> = report.results().iter().map(|r| r.check.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        // Error and violation both count as violations.
        assert_eq!(report.violation_count(), 2);
        assert!(report.results()[2]
            .evidence
            .as_deref()
            .unwrap()
            .contains("execution failed"));
    }

    #[test]
    fn no_short_circuit_on_violation() {
        let mut set = CheckSet::new();
        for i in 0..4 {
            let id: &'static str = ["a", "b", "c", "d"][i];
            set.register(Check::new(id, CheckCategory::Filesystem), |_| {
                CheckOutcome::Violation("hit".to_string())
            });
        }
        let probe = ScriptedProbe::new();
        let report = set.run_all(&probe);
        assert_eq!(report.results().len(), 4);
        assert_eq!(report.violation_count(), 4);
    }
}
