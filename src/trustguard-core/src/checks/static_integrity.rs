//! Static tamper and integrity verification.
//!
//! One-shot checks of the installed application against the baseline
//! trust store: package signature digest, critical resource checksums,
//! critical module checksums, installer origin, and required manifest
//! permission declarations.
//!
//! All checks read only; the sole side effect is logging. Verification
//! failure and verification-impossible are treated identically: a
//! resource that cannot be read records `passed=false` with evidence.

use std::sync::Arc;

use tracing::info;

use crate::baseline::BaselineStore;
use crate::checks::{CheckOutcome, CheckSet};
use crate::digest::{constant_time_eq, normalize_sha256, sha256_hex};
use crate::probe::PlatformProbe;
use crate::types::{Check, CheckCategory, DetectionReport};

/// One-shot verifier of the application's static integrity.
pub struct StaticIntegrityVerifier {
    checks: CheckSet,
    probe: Arc<dyn PlatformProbe>,
}

impl StaticIntegrityVerifier {
    /// Build the verifier, registering its five checks against the store.
    pub fn new(
        baseline: Arc<BaselineStore>,
        probe: Arc<dyn PlatformProbe>,
        allow_sideload: bool,
    ) -> Self {
        let mut checks = CheckSet::new();

        let store = Arc::clone(&baseline);
        checks.register(
            Check::new("package-signature", CheckCategory::Signature),
            move |probe| signature_check(&store, probe),
        );

        let store = Arc::clone(&baseline);
        checks.register(
            Check::new("resource-checksums", CheckCategory::Filesystem),
            move |probe| checksum_check("resource", &store.resources, probe),
        );

        let store = Arc::clone(&baseline);
        checks.register(
            Check::new("module-checksums", CheckCategory::Filesystem),
            move |probe| checksum_check("module", &store.modules, probe),
        );

        let store = Arc::clone(&baseline);
        checks.register(
            Check::new("installer-origin", CheckCategory::Installer),
            move |probe| installer_check(&store, probe, allow_sideload),
        );

        let store = Arc::clone(&baseline);
        checks.register(
            Check::new("manifest-permissions", CheckCategory::Manifest),
            move |probe| permissions_check(&store, probe),
        );

        Self { checks, probe }
    }

    /// Execute every registered check and return the ordered report.
    pub fn run_all(&self) -> DetectionReport {
        let report = self.checks.run_all(self.probe.as_ref());
        info!(
            checks = report.results().len(),
            violations = report.violation_count(),
            "static integrity pass complete"
        );
        report
    }
}

fn signature_check(store: &BaselineStore, probe: &dyn PlatformProbe) -> CheckOutcome {
    let Some(expected) = normalize_sha256(&store.signature_sha256) else {
        return CheckOutcome::Error("baseline signature digest malformed".to_string());
    };
    match probe.signature_sha256() {
        Some(actual) => {
            let Some(actual) = normalize_sha256(&actual) else {
                return CheckOutcome::Error("live signature digest malformed".to_string());
            };
            if constant_time_eq(expected.as_bytes(), actual.as_bytes()) {
                CheckOutcome::Pass
            } else {
                CheckOutcome::Violation(format!(
                    "signature digest mismatch (got {})",
                    &actual[..16]
                ))
            }
        }
        None => CheckOutcome::Error("package signature unreadable".to_string()),
    }
}

fn checksum_check(
    kind: &str,
    expected: &std::collections::BTreeMap<String, String>,
    probe: &dyn PlatformProbe,
) -> CheckOutcome {
    let mut failed: Vec<&str> = Vec::new();
    for (path, want) in expected {
        match probe.read_bytes(path) {
            Ok(data) => {
                let got = sha256_hex(&data);
                let matches = normalize_sha256(want)
                    .map(|w| constant_time_eq(w.as_bytes(), got.as_bytes()))
                    .unwrap_or(false);
                if !matches {
                    failed.push(path);
                }
            }
            // Unreadable counts the same as mismatched.
            Err(_) => failed.push(path),
        }
    }

    if failed.is_empty() {
        CheckOutcome::Pass
    } else {
        CheckOutcome::Violation(format!(
            "{} of {} {kind} checksums failed: {}",
            failed.len(),
            expected.len(),
            failed.join(", ")
        ))
    }
}

fn installer_check(
    store: &BaselineStore,
    probe: &dyn PlatformProbe,
    allow_sideload: bool,
) -> CheckOutcome {
    match probe.installer_package() {
        Some(installer) => {
            if store.allowed_installers.iter().any(|a| a == &installer) {
                CheckOutcome::Pass
            } else {
                CheckOutcome::Violation(format!("installer not allow-listed: {installer}"))
            }
        }
        None if allow_sideload => CheckOutcome::Pass,
        None => CheckOutcome::Violation("unknown installer origin (sideload)".to_string()),
    }
}

fn permissions_check(store: &BaselineStore, probe: &dyn PlatformProbe) -> CheckOutcome {
    let declared = probe.declared_permissions();
    let missing: Vec<&str> = store
        .required_permissions
        .iter()
        .filter(|p| !declared.contains(p))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        CheckOutcome::Pass
    } else {
        CheckOutcome::Violation(format!(
            "required permissions not declared: {}",
            missing.join(", ")
        ))
    }
}
