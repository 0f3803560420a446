//! trustguard-baseline-tool - Baseline trust store generator for TrustGuard.
//!
//! Hashes release artifacts and emits the sealed JSON trust store the
//! engine verifies at startup.
//!
//! ## Usage
//!
//! ```bash
//! # Generate a store for a release
//! trustguard-baseline-tool generate \
//!     --version 2.1.0 \
//!     --signed-binary target/release/app \
//!     --root release/ \
//!     --resource assets/policy.json \
//!     --module core/payments \
//!     --installer com.android.vending \
//!     --permission android.permission.INTERNET \
//!     --pin "api.example.com=8f43..." \
//!     --output baseline.json
//!
//! # Verify a store's self-integrity digest
//! trustguard-baseline-tool verify --store baseline.json
//!
//! # Hash one artifact
//! trustguard-baseline-tool hash --file assets/policy.json
//! ```

mod generate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use generate::{GenerateSpec, SignatureSource};
use trustguard_core::BaselineStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Baseline trust store generator for TrustGuard.
///
/// Produces the sealed store of signature digests, resource checksums,
/// policy lists, and certificate pins that the engine loads at startup.
#[derive(Parser)]
#[command(name = "trustguard-baseline-tool")]
#[command(version = VERSION)]
#[command(about = "Baseline trust store generator for TrustGuard")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sealed baseline trust store
    Generate {
        /// Application version the store is generated for
        #[arg(long, default_value = VERSION)]
        version: String,

        /// Expected signature digest (SHA-256 hex)
        #[arg(long, conflicts_with = "signed_binary")]
        signature: Option<String>,

        /// Signing artifact to hash for the signature digest
        #[arg(long)]
        signed_binary: Option<PathBuf>,

        /// Root directory resource/module paths are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Critical resource path, relative to --root (repeatable)
        #[arg(long = "resource")]
        resources: Vec<String>,

        /// Critical module path, relative to --root (repeatable)
        #[arg(long = "module")]
        modules: Vec<String>,

        /// Legitimate installer identifier (repeatable)
        #[arg(long = "installer")]
        installers: Vec<String>,

        /// Required manifest permission (repeatable)
        #[arg(long = "permission")]
        permissions: Vec<String>,

        /// Certificate pin as host=digest[,digest...] (repeatable)
        #[arg(long = "pin")]
        pins: Vec<String>,

        /// Output store path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Load a store and verify its self-integrity digest
    Verify {
        /// Path to the store
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Print the SHA-256 digest of one file
    Hash {
        /// Path to the file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Generate {
            version,
            signature,
            signed_binary,
            root,
            resources,
            modules,
            installers,
            permissions,
            pins,
            output,
            pretty,
        } => {
            let signature = match (signature, signed_binary) {
                (Some(digest), None) => SignatureSource::Digest(digest),
                (None, Some(path)) => SignatureSource::File(path),
                _ => anyhow::bail!("exactly one of --signature or --signed-binary is required"),
            };

            eprintln!("Generating baseline trust store...");
            eprintln!("  Version: {}", version);
            eprintln!("  Root: {}", root.display());

            let spec = GenerateSpec {
                version,
                signature,
                root,
                resources,
                modules,
                installers,
                permissions,
                pins,
            };
            let store = generate::build_store(&spec)?;

            eprintln!("  Resources: {}", store.resources.len());
            eprintln!("  Modules: {}", store.modules.len());
            eprintln!("  Pinned hosts: {}", store.pins.len());
            eprintln!("  Store hash: {}", store.store_hash);

            let json = if pretty {
                serde_json::to_string_pretty(&store)?
            } else {
                serde_json::to_string(&store)?
            };

            if let Some(output_path) = output {
                std::fs::write(&output_path, &json)?;
                eprintln!("  Output: {}", output_path.display());
            } else {
                println!("{}", json);
            }

            eprintln!("\nStore generated and sealed successfully.");
        }

        Commands::Verify { store } => {
            let loaded = BaselineStore::load(&store)?;
            println!("store: {}", store.display());
            println!("version: {}", loaded.version);
            println!("generated_at: {}", loaded.generated_at);
            println!("resources: {}", loaded.resources.len());
            println!("modules: {}", loaded.modules.len());
            println!("pinned hosts: {}", loaded.pins.len());
            println!("integrity: OK");
        }

        Commands::Hash { file } => {
            let digest = generate::hash_file(&file)?;
            println!("{}", digest);
        }
    }

    Ok(())
}
