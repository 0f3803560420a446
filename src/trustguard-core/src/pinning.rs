//! Certificate pin validation.
//!
//! The network layer calls [`CertificateTrustValidator::validate`] once
//! per outbound TLS handshake with the peer's SPKI SHA-256. Only hosts in
//! the configured pin set are subject to pinning; everything else passes.
//! A mismatch on a pinned host is a hard trust breach: the validator
//! emits a `CertificateMismatch` threat event (which latches the trust
//! state to Critical) and returns `false`.
//!
//! The read path supports concurrent callers; [`CertificateTrustValidator::update_pins`]
//! swaps the whole set atomically behind an `RwLock<Arc<_>>`, so an
//! in-flight validation sees either the old or the new set, never a torn
//! mixture. The validator never blocks on I/O and never panics; every
//! lookup failure is treated as a pin failure (fail-closed).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::aggregator::RiskAggregator;
use crate::baseline::BaselineStore;
use crate::digest::{constant_time_eq, normalize_sha256};
use crate::error::TrustError;
use crate::types::{ThreatEvent, ThreatKind};

/// Immutable mapping from hostname to accepted SPKI SHA-256 digests.
#[derive(Debug, Clone, Default)]
pub struct PinSet {
    pins: BTreeMap<String, BTreeSet<String>>,
}

impl PinSet {
    /// An empty set: no host is subject to pinning.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from host → digest-list entries.
    ///
    /// # Errors
    ///
    /// Rejects any entry that is not a SHA-256 digest.
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Result<Self, TrustError> {
        let mut pins = BTreeMap::new();
        for (host, hashes) in entries {
            let mut set = BTreeSet::new();
            for hash in hashes {
                let normalized =
                    normalize_sha256(&hash).ok_or_else(|| TrustError::InvalidPin {
                        host: host.clone(),
                        reason: format!("not a SHA-256 digest: {hash}"),
                    })?;
                set.insert(normalized);
            }
            pins.insert(host, set);
        }
        Ok(Self { pins })
    }

    /// Build the set declared by a baseline store.
    ///
    /// # Errors
    ///
    /// Same validation as [`PinSet::new`]; a verified store never fails.
    pub fn from_baseline(store: &BaselineStore) -> Result<Self, TrustError> {
        Self::new(store.pins.clone())
    }

    /// Whether `host` is subject to pinning.
    pub fn is_pinned(&self, host: &str) -> bool {
        self.pins.contains_key(host)
    }

    /// Whether `digest_hex` is an accepted pin for `host`.
    ///
    /// Every member is compared in constant time; membership testing does
    /// not leak which pin was closest.
    pub fn accepts(&self, host: &str, digest_hex: &str) -> bool {
        let Some(set) = self.pins.get(host) else {
            return false;
        };
        let mut matched = false;
        for pin in set {
            matched |= constant_time_eq(pin.as_bytes(), digest_hex.as_bytes());
        }
        matched
    }

    /// Number of pinned hosts.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Whether no host is pinned.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// TLS-handshake interception hook backed by an atomically swappable pin set.
pub struct CertificateTrustValidator {
    pins: RwLock<Arc<PinSet>>,
    aggregator: Arc<RiskAggregator>,
}

impl CertificateTrustValidator {
    /// Create a validator over an initial pin set.
    pub fn new(pins: PinSet, aggregator: Arc<RiskAggregator>) -> Self {
        Self {
            pins: RwLock::new(Arc::new(pins)),
            aggregator,
        }
    }

    /// Validate a TLS peer's public-key hash for `host`.
    ///
    /// Returns `true` iff the host is not subject to pinning, or the hash
    /// is a member of the host's pin set. On mismatch a
    /// `CertificateMismatch` event is emitted before returning `false`.
    /// Safe to call from any thread; never panics, never blocks on I/O.
    pub fn validate(&self, host: &str, presented_key_hash: &[u8]) -> bool {
        let pins = match self.pins.read() {
            Ok(guard) => Arc::clone(&guard),
            // Poisoned lock: cannot prove the pin set, fail closed.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        };

        if !pins.is_pinned(host) {
            debug!(host, "host not subject to pinning");
            return true;
        }

        let digest_hex = hex::encode(presented_key_hash);
        let accepted = presented_key_hash.len() == 32 && pins.accepts(host, &digest_hex);

        if !accepted {
            warn!(host, presented = %digest_hex, "certificate pin mismatch");
            self.aggregator
                .ingest_event(ThreatEvent::now(ThreatKind::CertificateMismatch, host));
        }
        accepted
    }

    /// Atomically replace the pin set.
    ///
    /// In-flight validations complete against the set they already hold;
    /// every subsequent validation sees the new set. Never partial.
    pub fn update_pins(&self, new_set: PinSet) {
        let new_set = Arc::new(new_set);
        match self.pins.write() {
            Ok(mut guard) => *guard = new_set,
            Err(poisoned) => *poisoned.into_inner() = new_set,
        }
        debug!("pin set updated");
    }

    /// Snapshot of the current pin set.
    pub fn current_pins(&self) -> Arc<PinSet> {
        match self.pins.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}
