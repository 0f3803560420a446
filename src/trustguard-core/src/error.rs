//! Error types for engine initialization.
//!
//! Only configuration failures surface as `Err`. Detector-level failures
//! are absorbed into [`crate::types::CheckResult`] evidence (fail-closed)
//! and never propagate.

use thiserror::Error;

/// Errors that can occur while constructing the engine.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The baseline trust store file does not exist or cannot be read.
    #[error("Baseline store unreadable at {path}: {reason}")]
    BaselineUnreadable {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },

    /// The baseline trust store could not be parsed.
    #[error("Baseline store corrupt: {reason}")]
    BaselineCorrupt {
        /// Parse failure detail.
        reason: String,
    },

    /// The baseline trust store failed its own integrity digest.
    ///
    /// A store whose content no longer matches its `store_hash` must be
    /// treated as tampered; the engine refuses to start rather than
    /// defaulting to a trusted state.
    #[error("Baseline store integrity digest mismatch")]
    BaselineIntegrity,

    /// A pin entry in the store is not a valid SHA-256 digest.
    #[error("Invalid pin for host {host}: {reason}")]
    InvalidPin {
        /// Host the pin was declared for.
        host: String,
        /// Why the pin was rejected.
        reason: String,
    },

    /// Invalid engine configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}
