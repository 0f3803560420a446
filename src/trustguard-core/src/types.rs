//! Core value types shared by every detector.
//!
//! A [`Check`] identifies one verification and is fixed at registration
//! time. Running a check produces an immutable [`CheckResult`]; one full
//! detector pass produces a [`DetectionReport`]. Risk is always derived
//! from counts via [`RiskLevel::from_violation_count`]; nothing outside
//! the aggregator hand-sets a risk level.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Category of a verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    /// Package/binary signature digest comparison.
    Signature,
    /// Filesystem artifact presence or checksum.
    Filesystem,
    /// Installed package / root-management app presence.
    Package,
    /// System build property inspection.
    Property,
    /// Loaded shared-library inspection.
    Library,
    /// Mandatory access control (SELinux) status.
    Selinux,
    /// Debugger / debug-flag inspection.
    Debug,
    /// Installing origin verification.
    Installer,
    /// Manifest/permission declaration verification.
    Manifest,
    /// TLS certificate pin validation.
    Certificate,
    /// Hooking-framework indicator scan.
    Hooking,
    /// Emulator fingerprint scan.
    Emulator,
    /// Process memory / mapping tamper scan.
    Memory,
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Signature => "signature",
            Self::Filesystem => "filesystem",
            Self::Package => "package",
            Self::Property => "property",
            Self::Library => "library",
            Self::Selinux => "selinux",
            Self::Debug => "debug",
            Self::Installer => "installer",
            Self::Manifest => "manifest",
            Self::Certificate => "certificate",
            Self::Hooking => "hooking",
            Self::Emulator => "emulator",
            Self::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// Identity of a single verification, fixed at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Check {
    /// Stable identifier, e.g. `"su-binaries"`.
    pub id: String,
    /// Category the check belongs to.
    pub category: CheckCategory,
}

impl Check {
    /// Define a check.
    pub fn new(id: impl Into<String>, category: CheckCategory) -> Self {
        Self {
            id: id.into(),
            category,
        }
    }
}

/// Outcome of running one [`Check`]. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// The check that produced this result.
    pub check: Check,
    /// Whether the check passed. An unexecutable check is `false`.
    pub passed: bool,
    /// Human-readable evidence for a failure (or an execution error).
    pub evidence: Option<String>,
    /// Unix timestamp (seconds) when the check ran.
    pub timestamp: i64,
}

impl CheckResult {
    /// Record a passing result.
    pub fn pass(check: Check) -> Self {
        Self {
            check,
            passed: true,
            evidence: None,
            timestamp: current_timestamp(),
        }
    }

    /// Record a violation with supporting evidence.
    pub fn fail(check: Check, evidence: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            evidence: Some(evidence.into()),
            timestamp: current_timestamp(),
        }
    }
}

/// Ordered results of one full detector pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    results: Vec<CheckResult>,
}

impl DetectionReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result. Registration order is preserved.
    pub fn push(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    /// Merge another report's results after this one's.
    pub fn extend(&mut self, other: DetectionReport) {
        self.results.extend(other.results);
    }

    /// All results, in registration order.
    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    /// Number of checks that did not pass.
    pub fn violation_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Iterator over the failing results.
    pub fn violations(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// True when every check passed.
    pub fn is_clean(&self) -> bool {
        self.violation_count() == 0
    }

    /// Whether any check in one of the given categories failed.
    pub fn has_violation_in(&self, categories: &[CheckCategory]) -> bool {
        self.violations()
            .any(|r| categories.contains(&r.check.category))
    }
}

/// Ordered risk level derived from violation/threat counts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// No violations observed.
    #[default]
    Low,
    /// 1–2 violations.
    Medium,
    /// 3–4 violations.
    High,
    /// 5 or more violations, or a certificate pin breach.
    Critical,
}

impl RiskLevel {
    /// Derive a risk level from a violation or threat count.
    ///
    /// The boundaries are a fixed contract: `0 → Low`, `1–2 → Medium`,
    /// `3–4 → High`, `≥5 → Critical`.
    pub fn from_violation_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1..=2 => Self::Medium,
            3..=4 => Self::High,
            _ => Self::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Kind of a detected runtime threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatKind {
    /// A debugger is attached to the process.
    Debugging,
    /// The package signature no longer matches the baseline.
    CodeModification,
    /// A known injection library is loaded.
    CodeInjection,
    /// The device fingerprint matches a known emulator.
    Emulation,
    /// A hooking framework is active.
    Hooking,
    /// Process memory mappings show tampering.
    MemoryTampering,
    /// A static integrity pass found signature/checksum violations.
    IntegrityViolation,
    /// A TLS peer presented a key outside the pinned set.
    CertificateMismatch,
}

impl ThreatKind {
    /// Defensive action classes fired for this threat kind.
    ///
    /// This mapping is a fixed contract. `CertificateMismatch` is the one
    /// kind that fires two action classes.
    pub fn actions(self) -> &'static [DefensiveAction] {
        match self {
            Self::Debugging => &[DefensiveAction::TerminateProcess],
            Self::CodeModification => &[DefensiveAction::DisableSensitiveFeatures],
            Self::CodeInjection => &[DefensiveAction::PurgeSensitiveData],
            Self::Emulation => &[DefensiveAction::RestrictFunctionality],
            Self::Hooking => &[DefensiveAction::RestartCriticalComponents],
            Self::MemoryTampering => &[DefensiveAction::ReloadSecurityState],
            Self::IntegrityViolation => &[DefensiveAction::ActivateMaximumRestriction],
            Self::CertificateMismatch => &[
                DefensiveAction::AbortNetworkOperation,
                DefensiveAction::ActivateMaximumRestriction,
            ],
        }
    }
}

/// A discrete threat detection. Append-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatEvent {
    /// What was detected.
    pub kind: ThreatKind,
    /// Unix timestamp (seconds) of detection.
    pub detected_at: i64,
    /// Component or artifact that triggered the detection.
    pub source: String,
}

impl ThreatEvent {
    /// Record a threat detection happening now.
    pub fn now(kind: ThreatKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            detected_at: current_timestamp(),
            source: source.into(),
        }
    }
}

/// Defensive action class dispatched to the host application.
///
/// The actual effect (killing the process, wiping caches, feature gating)
/// is the host's responsibility via [`crate::aggregator::ResponseHooks`];
/// the engine's contract is which class fires for which threat kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefensiveAction {
    /// Terminate the process (irrecoverable).
    TerminateProcess,
    /// Disable sensitive features.
    DisableSensitiveFeatures,
    /// Purge sensitive in-memory data.
    PurgeSensitiveData,
    /// Restrict functionality.
    RestrictFunctionality,
    /// Restart critical components.
    RestartCriticalComponents,
    /// Reload security state from the trusted store.
    ReloadSecurityState,
    /// Activate maximum restriction.
    ActivateMaximumRestriction,
    /// Abort the in-flight network operation.
    AbortNetworkOperation,
}

/// Snapshot of the engine's trust verdict.
///
/// Owned exclusively by the aggregator; callers always receive a complete
/// copy, never a view into partially updated state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustState {
    /// Current overall risk, recomputed on every ingest.
    pub overall_risk: RiskLevel,
    /// Whether the runtime monitor loop is active.
    pub is_monitoring: bool,
    /// Threats recorded this monitoring session. Monotonic until the next
    /// `start_monitoring()`.
    pub threat_count: u64,
    /// Unix timestamp of the most recent threat, if any.
    pub last_threat_at: Option<i64>,
    /// The most recent static detection report, if a pass has run.
    pub last_report: Option<DetectionReport>,
}

/// Current Unix timestamp in seconds.
pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
