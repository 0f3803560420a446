//! Baseline trust store generation.
//!
//! Walks the release artifacts, hashes the critical resources and
//! modules, embeds the policy lists and certificate pins, and seals the
//! store with its self-integrity digest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;

use trustguard_core::{normalize_sha256, sha256_hex, BaselineStore};

/// Error during store generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("signature digest is not a SHA-256 hex digest: {0}")]
    InvalidSignature(String),

    #[error("pin entry must be host=digest[,digest...]: {0}")]
    MalformedPin(String),

    #[error("pin digest for {host} is not a SHA-256 hex digest: {digest}")]
    InvalidPinDigest { host: String, digest: String },
}

/// Inputs collected from the command line.
pub struct GenerateSpec {
    /// Application version the store is generated for.
    pub version: String,
    /// Expected signature digest, or a binary to hash for it.
    pub signature: SignatureSource,
    /// Root directory resource/module paths are relative to.
    pub root: PathBuf,
    /// Critical resources, relative to `root`.
    pub resources: Vec<String>,
    /// Critical modules, relative to `root`.
    pub modules: Vec<String>,
    /// Legitimate distribution channels.
    pub installers: Vec<String>,
    /// Permissions the manifest must declare.
    pub permissions: Vec<String>,
    /// Raw `host=digest[,digest...]` pin entries.
    pub pins: Vec<String>,
}

/// Where the expected signature digest comes from.
pub enum SignatureSource {
    /// A literal SHA-256 hex digest.
    Digest(String),
    /// A signing artifact to hash.
    File(PathBuf),
}

/// Build and seal a store from the collected inputs.
pub fn build_store(spec: &GenerateSpec) -> Result<BaselineStore, GenerateError> {
    let signature_sha256 = match &spec.signature {
        SignatureSource::Digest(digest) => normalize_sha256(digest)
            .ok_or_else(|| GenerateError::InvalidSignature(digest.clone()))?,
        SignatureSource::File(path) => hash_file(path)?,
    };

    let mut store = BaselineStore {
        version: spec.version.clone(),
        generated_at: Utc::now().to_rfc3339(),
        signature_sha256,
        resources: hash_entries(&spec.root, &spec.resources)?,
        modules: hash_entries(&spec.root, &spec.modules)?,
        allowed_installers: spec.installers.clone(),
        required_permissions: spec.permissions.clone(),
        pins: parse_pins(&spec.pins)?,
        store_hash: String::new(),
    };
    store.seal();
    Ok(store)
}

/// SHA-256 hex digest of a file's contents.
pub fn hash_file(path: &Path) -> Result<String, GenerateError> {
    let data = std::fs::read(path).map_err(|source| GenerateError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    Ok(sha256_hex(&data))
}

fn hash_entries(root: &Path, entries: &[String]) -> Result<BTreeMap<String, String>, GenerateError> {
    let mut out = BTreeMap::new();
    for entry in entries {
        let hash = hash_file(&root.join(entry))?;
        out.insert(entry.clone(), hash);
    }
    Ok(out)
}

/// Parse `host=digest[,digest...]` entries, merging repeated hosts.
pub fn parse_pins(entries: &[String]) -> Result<BTreeMap<String, Vec<String>>, GenerateError> {
    let mut pins: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in entries {
        let (host, digests) = entry
            .split_once('=')
            .ok_or_else(|| GenerateError::MalformedPin(entry.clone()))?;
        if host.is_empty() || digests.is_empty() {
            return Err(GenerateError::MalformedPin(entry.clone()));
        }
        for digest in digests.split(',') {
            let normalized =
                normalize_sha256(digest).ok_or_else(|| GenerateError::InvalidPinDigest {
                    host: host.to_string(),
                    digest: digest.to_string(),
                })?;
            pins.entry(host.to_string()).or_default().push(normalized);
        }
    }
    Ok(pins)
}
