//! Baseline trust store.
//!
//! The store is the bundled, read-only set of expectations the engine
//! verifies the live application against: the expected package signature
//! digest, checksums for critical resources and modules, the installer
//! allow-list, required permission declarations, and per-host certificate
//! pin sets.
//!
//! The store carries its own integrity digest (`store_hash`, SHA-256 over
//! the sorted content). A store that is missing, unparsable, or fails that
//! digest is a configuration failure: the engine refuses to start instead
//! of reporting a trustworthy state it cannot back up.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::digest::{constant_time_eq, normalize_sha256};
use crate::error::TrustError;

/// Bundled trust store loaded at engine startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineStore {
    /// Application version this store was generated for.
    pub version: String,
    /// ISO 8601 timestamp when the store was generated.
    pub generated_at: String,
    /// Expected package/binary signature digest (SHA-256 hex).
    pub signature_sha256: String,
    /// Critical resource checksums: relative path → SHA-256 hex.
    pub resources: BTreeMap<String, String>,
    /// Critical module checksums: module path → SHA-256 hex.
    pub modules: BTreeMap<String, String>,
    /// Legitimate distribution channels (installer identifiers).
    pub allowed_installers: Vec<String>,
    /// Permissions the application manifest must declare.
    pub required_permissions: Vec<String>,
    /// Certificate pins: hostname → accepted SPKI SHA-256 digests.
    pub pins: BTreeMap<String, Vec<String>>,
    /// SHA-256 over the sorted store content (self-integrity digest).
    pub store_hash: String,
}

impl BaselineStore {
    /// Load and verify a store from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails fast on an unreadable file, a parse failure, an integrity
    /// digest mismatch, or a malformed pin entry.
    pub fn load(path: &Path) -> Result<Self, TrustError> {
        info!(path = %path.display(), "loading baseline trust store");

        let data = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "baseline store unreadable");
            TrustError::BaselineUnreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let store: BaselineStore = serde_json::from_str(&data).map_err(|e| {
            error!(error = %e, "baseline store parse failure");
            TrustError::BaselineCorrupt {
                reason: e.to_string(),
            }
        })?;

        store.verify()?;
        info!(
            version = %store.version,
            resources = store.resources.len(),
            modules = store.modules.len(),
            pinned_hosts = store.pins.len(),
            "baseline trust store verified"
        );
        Ok(store)
    }

    /// Verify the store's internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::BaselineIntegrity`] on a digest mismatch and
    /// [`TrustError::InvalidPin`] on a malformed pin digest.
    pub fn verify(&self) -> Result<(), TrustError> {
        let computed = self.compute_store_hash();
        let stored = self
            .store_hash
            .strip_prefix("sha256:")
            .unwrap_or(&self.store_hash);

        if !constant_time_eq(computed.as_bytes(), stored.to_ascii_lowercase().as_bytes()) {
            error!("baseline store_hash mismatch");
            return Err(TrustError::BaselineIntegrity);
        }

        for (host, hashes) in &self.pins {
            for hash in hashes {
                if normalize_sha256(hash).is_none() {
                    return Err(TrustError::InvalidPin {
                        host: host.clone(),
                        reason: format!("not a SHA-256 digest: {hash}"),
                    });
                }
            }
        }

        debug!("baseline store digest verified");
        Ok(())
    }

    /// Compute the store's self-integrity digest.
    ///
    /// Fields are hashed in declaration order; maps iterate in key order
    /// (`BTreeMap`), list fields in stored order. `store_hash` itself is
    /// excluded. The baseline tool uses the same function when generating.
    pub fn compute_store_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.as_bytes());
        hasher.update(self.generated_at.as_bytes());
        hasher.update(self.signature_sha256.as_bytes());
        for (path, hash) in &self.resources {
            hasher.update(path.as_bytes());
            hasher.update(hash.as_bytes());
        }
        for (module, hash) in &self.modules {
            hasher.update(module.as_bytes());
            hasher.update(hash.as_bytes());
        }
        for installer in &self.allowed_installers {
            hasher.update(installer.as_bytes());
        }
        for permission in &self.required_permissions {
            hasher.update(permission.as_bytes());
        }
        for (host, hashes) in &self.pins {
            hasher.update(host.as_bytes());
            for hash in hashes {
                hasher.update(hash.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Stamp the store with its computed digest.
    pub fn seal(&mut self) {
        self.store_hash = self.compute_store_hash();
    }
}

/// A small sealed store for unit tests across the crate.
#[cfg(test)]
pub(crate) fn sample_store() -> BaselineStore {
    let mut store = BaselineStore {
        version: "2.1.0".to_string(),
        generated_at: "2026-08-01T00:00:00Z".to_string(),
        signature_sha256: crate::digest::sha256_hex(b"release-signing-key"),
        resources: BTreeMap::from([(
            "assets/policy.json".to_string(),
            crate::digest::sha256_hex(b"policy"),
        )]),
        modules: BTreeMap::from([(
            "core/payments".to_string(),
            crate::digest::sha256_hex(b"payments"),
        )]),
        allowed_installers: vec!["com.android.vending".to_string()],
        required_permissions: vec!["android.permission.INTERNET".to_string()],
        pins: BTreeMap::from([(
            "api.example.com".to_string(),
            vec![crate::digest::sha256_hex(b"spki")],
        )]),
        store_hash: String::new(),
    };
    store.seal();
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sealed_store_verifies() {
        assert!(sample_store().verify().is_ok());
    }

    #[test]
    fn load_round_trip() {
        let store = sample_store();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string_pretty(&store).unwrap().as_bytes())
            .unwrap();

        let loaded = BaselineStore::load(&path).unwrap();
        assert_eq!(loaded.version, "2.1.0");
        assert_eq!(loaded.store_hash, store.store_hash);
    }

    #[test]
    fn missing_store_is_fatal() {
        let err = BaselineStore::load(Path::new("/nonexistent/baseline.json")).unwrap_err();
        assert!(matches!(err, TrustError::BaselineUnreadable { .. }));
    }

    #[test]
    fn corrupt_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = BaselineStore::load(&path).unwrap_err();
        assert!(matches!(err, TrustError::BaselineCorrupt { .. }));
    }

    #[test]
    fn tampered_store_fails_digest() {
        let mut store = sample_store();
        store
            .resources
            .insert("assets/policy.json".to_string(), "0".repeat(64));
        // store_hash not re-sealed: digest no longer matches
        assert!(matches!(store.verify(), Err(TrustError::BaselineIntegrity)));
    }

    #[test]
    fn malformed_pin_is_rejected() {
        let mut store = sample_store();
        store
            .pins
            .insert("evil.example.com".to_string(), vec!["nothex".to_string()]);
        store.seal();
        assert!(matches!(store.verify(), Err(TrustError::InvalidPin { .. })));
    }
}
