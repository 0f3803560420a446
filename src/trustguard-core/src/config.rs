//! Configuration for the trust engine.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for [`crate::engine::DeviceTrustEngine`].
///
/// The violation-count → risk boundaries are a fixed contract and are not
/// configurable; only genuine app policy lives here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the bundled baseline trust store (JSON).
    pub baseline_path: PathBuf,
    /// Interval between runtime monitor ticks.
    pub tick_interval: Duration,
    /// Whether an unknown/sideloaded installer origin passes the
    /// installer-origin check.
    pub allow_sideload: bool,
    /// Maximum retained threat events (append-only history cap).
    pub threat_history_cap: usize,
    /// Internal deadline for shell-command checks (`su` invocation).
    pub command_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_path: PathBuf::from("baseline.json"),
            tick_interval: Duration::from_millis(1000),
            allow_sideload: false,
            threat_history_cap: 1000,
            command_timeout: Duration::from_millis(500),
        }
    }
}
