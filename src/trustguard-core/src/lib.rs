//! # trustguard-core
//!
//! Device trust and runtime self-protection engine: root/jailbreak
//! detection, static integrity verification, continuous runtime threat
//! monitoring, and certificate pin validation, aggregated into a single
//! trust state with an automatic defensive-action response.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   DeviceTrustEngine                          │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ StaticInteg- │  │ RootJail-    │  │ RuntimeThreat│      │
//! │  │ rityVerifier │  │ breakDetector│  │ Monitor      │      │
//! │  │ (one-shot)   │  │ (one-shot)   │  │ (poll loop)  │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │         │                 │                 │               │
//! │         ▼                 ▼                 ▼               │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │                 RiskAggregator                    │      │
//! │  │   (trust state, boundary law, response hooks)    │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           ▲                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │           CertificateTrustValidator               │      │
//! │  │        (SPKI pins, atomic pin updates)           │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All OS observation goes through the [`probe::PlatformProbe`] trait;
//! [`probe::HostProbe`] ships for unix-like hosts and
//! [`probe::ScriptedProbe`] for tests and integration harnesses.
//!
//! ## Security Properties
//!
//! - **Fail-closed**: a check that cannot execute counts as a violation;
//!   an unverifiable baseline refuses to initialize the engine
//! - **Full evidence**: every check always runs; detection never
//!   short-circuits after the first hit
//! - **Single trust state**: static, runtime, and pin signals aggregate
//!   through one owner with a fixed violation-count → risk boundary law
//! - **Automatic response**: each detection dispatches its defensive
//!   action synchronously before the detecting call returns

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod aggregator;
pub mod baseline;
pub mod checks;
pub mod config;
pub mod digest;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod pinning;
pub mod probe;
pub mod types;

#[cfg(test)]
mod testutil;

pub use aggregator::{LogOnlyHooks, ResponseHooks, RiskAggregator};
pub use baseline::BaselineStore;
pub use checks::root_jailbreak::RootJailbreakDetector;
pub use checks::static_integrity::StaticIntegrityVerifier;
pub use checks::{CheckOutcome, CheckSet};
pub use config::EngineConfig;
pub use digest::{constant_time_eq, normalize_sha256, sha256_hex};
pub use engine::DeviceTrustEngine;
pub use error::TrustError;
pub use monitor::RuntimeThreatMonitor;
pub use pinning::{CertificateTrustValidator, PinSet};
pub use probe::{HostProbe, MemoryRegion, PlatformProbe, ScriptedProbe};
pub use types::{
    Check, CheckCategory, CheckResult, DefensiveAction, DetectionReport, RiskLevel, ThreatEvent,
    ThreatKind, TrustState,
};
