//! Root / jailbreak detection.
//!
//! One-shot checks for the artifacts root and jailbreak tooling leaves
//! behind: su-class binaries, root-framework marker files, management
//! packages, a live `su` shell, insecure build properties, root-framework
//! shared libraries, disabled SELinux enforcement, and debug flags.
//!
//! Every check runs independently and always runs, so full evidence is
//! collected for the risk calculation even after the first hit. A check
//! that cannot execute records a violation, never a skip.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::checks::{CheckOutcome, CheckSet};
use crate::probe::PlatformProbe;
use crate::types::{Check, CheckCategory, DetectionReport};

/// su-class binaries at fixed paths (RootBeer-derived corpus).
const SU_PATHS: &[&str] = &[
    "/system/bin/su",
    "/system/xbin/su",
    "/system/bin/.ext/su",
    "/system/bin/failsafe/su",
    "/system/sd/xbin/su",
    "/system/usr/we-need-root/su",
    "/sbin/su",
    "/su/bin/su",
    "/data/local/su",
    "/data/local/bin/su",
    "/data/local/xbin/su",
    "/system/xbin/busybox",
    "/vendor/bin/su",
    "/odm/bin/su",
    "/product/bin/su",
];

/// Root-framework marker files.
const ROOT_MARKER_PATHS: &[&str] = &[
    "/data/adb/magisk",
    "/sbin/.magisk",
    "/cache/.disable_magisk",
    "/dev/.magisk.unblock",
    "/system/xposed.prop",
    "/system/framework/XposedBridge.jar",
];

/// Root-management application identifiers.
const ROOT_PACKAGES: &[&str] = &[
    "com.topjohnwu.magisk",
    "eu.chainfire.supersu",
    "com.noshufou.android.su",
    "com.koushikdutta.superuser",
    "com.thirdparty.superuser",
    "com.zachspong.temprootremovejb",
    "com.ramdroid.appquarantine",
];

/// Substrings identifying root-framework shared libraries.
const ROOT_LIBRARY_MARKERS: &[&str] = &["magisk", "supersu", "libsupol", "xposed"];

/// One-shot detector for root/jailbreak tooling.
pub struct RootJailbreakDetector {
    checks: CheckSet,
    probe: Arc<dyn PlatformProbe>,
}

impl RootJailbreakDetector {
    /// Build the detector, registering its eight checks.
    pub fn new(probe: Arc<dyn PlatformProbe>, command_timeout: Duration) -> Self {
        let mut checks = CheckSet::new();

        checks.register(
            Check::new("su-binaries", CheckCategory::Filesystem),
            |probe| path_scan(probe, SU_PATHS, "su binary present"),
        );

        checks.register(
            Check::new("root-markers", CheckCategory::Filesystem),
            |probe| path_scan(probe, ROOT_MARKER_PATHS, "root framework marker present"),
        );

        checks.register(
            Check::new("root-packages", CheckCategory::Package),
            |probe| {
                let found: Vec<&str> = ROOT_PACKAGES
                    .iter()
                    .copied()
                    .filter(|p| probe.package_installed(p))
                    .collect();
                if found.is_empty() {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Violation(format!(
                        "root management app installed: {}",
                        found.join(", ")
                    ))
                }
            },
        );

        checks.register(Check::new("su-command", CheckCategory::Package), move |probe| {
            // A usable su shell is the definitive root signal. The probe
            // imposes the deadline; an unavailable command is the clean
            // state, not an error.
            match probe.run_command("su", &["-c", "id"], command_timeout) {
                Some(output) => {
                    CheckOutcome::Violation(format!("su command succeeded: {output}"))
                }
                None => CheckOutcome::Pass,
            }
        });

        checks.register(
            Check::new("build-properties", CheckCategory::Property),
            |probe| {
                let mut findings = Vec::new();
                if let Some(tags) = probe.system_property("ro.build.tags") {
                    if tags.contains("test-keys") {
                        findings.push("ro.build.tags=test-keys".to_string());
                    }
                }
                if let Some(secure) = probe.system_property("ro.secure") {
                    if secure.trim() == "0" {
                        findings.push("ro.secure=0".to_string());
                    }
                }
                if findings.is_empty() {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Violation(format!(
                        "insecure build properties: {}",
                        findings.join(", ")
                    ))
                }
            },
        );

        checks.register(
            Check::new("root-libraries", CheckCategory::Library),
            |probe| {
                let found: Vec<String> = probe
                    .loaded_libraries()
                    .into_iter()
                    .filter(|lib| {
                        let lower = lib.to_lowercase();
                        ROOT_LIBRARY_MARKERS.iter().any(|m| lower.contains(m))
                    })
                    .collect();
                if found.is_empty() {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Violation(format!(
                        "root framework library loaded: {}",
                        found.join(", ")
                    ))
                }
            },
        );

        checks.register(
            Check::new("selinux-enforcement", CheckCategory::Selinux),
            |probe| match probe.selinux_enforcing() {
                Some(true) => CheckOutcome::Pass,
                Some(false) => {
                    CheckOutcome::Violation("SELinux not enforcing".to_string())
                }
                None => CheckOutcome::Error("SELinux status unreadable".to_string()),
            },
        );

        checks.register(Check::new("debug-flags", CheckCategory::Debug), |probe| {
            let mut findings = Vec::new();
            if probe.debugger_attached() {
                findings.push("debugger attached".to_string());
            }
            if let Some(debuggable) = probe.system_property("ro.debuggable") {
                if debuggable.trim() == "1" {
                    findings.push("ro.debuggable=1".to_string());
                }
            }
            if findings.is_empty() {
                CheckOutcome::Pass
            } else {
                CheckOutcome::Violation(findings.join(", "))
            }
        });

        Self { checks, probe }
    }

    /// Execute every registered check and return the ordered report.
    pub fn run_all(&self) -> DetectionReport {
        let report = self.checks.run_all(self.probe.as_ref());
        info!(
            checks = report.results().len(),
            violations = report.violation_count(),
            "root/jailbreak pass complete"
        );
        report
    }
}

fn path_scan(probe: &dyn PlatformProbe, paths: &[&str], label: &str) -> CheckOutcome {
    let found: Vec<&str> = paths
        .iter()
        .copied()
        .filter(|p| probe.path_exists(p))
        .collect();
    if found.is_empty() {
        CheckOutcome::Pass
    } else {
        CheckOutcome::Violation(format!("{label}: {}", found.join(", ")))
    }
}
