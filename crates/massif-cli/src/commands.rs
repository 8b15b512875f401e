//! CLI command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use massif_core::{search, verify_proof, Hash, Ordinal, PlotIndex, Proof, PublicKey};

/// Massif CLI - proof-of-capacity plotting and verification
#[derive(Parser)]
#[command(name = "massif")]
#[command(about = "Proof-of-capacity plot management and mining", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and fully plot a new index
    Init {
        /// Key-space bit length (index holds 2^B records)
        bit_length: usize,

        /// Directory the index file lives in
        directory: PathBuf,

        /// Compressed secp256k1 public key (hex)
        pubkey: String,
    },

    /// Search for a verifiable proof starting from a challenge
    Generate {
        /// Directory the index file lives in
        directory: PathBuf,

        /// Starting challenge (hex, 32 bytes)
        challenge: String,

        /// Compressed secp256k1 public key (hex)
        pubkey: String,

        /// Key-space bit length of the index
        bit_length: usize,
    },

    /// Verify a proof string against a challenge and public key
    Verify {
        /// Proof in `<X-bits>,<X'-bits>` form
        proof: String,

        /// Challenge (hex, 32 bytes)
        challenge: String,

        /// Compressed secp256k1 public key (hex)
        pubkey: String,

        /// Bit length the proof claims
        bit_length: usize,
    },
}

/// Run the CLI
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init {
            bit_length,
            directory,
            pubkey,
        } => {
            let public_key = PublicKey::from_hex(&pubkey).context("parsing public key")?;
            println!("{}", public_key.to_hex());

            let index = PlotIndex::open(&directory, &public_key, Ordinal::V1, bit_length)
                .context("opening index")?;
            index.plot().wait().await.context("plotting index")?;
            info!(path = %index.path().display(), "index fully plotted");
        }

        Commands::Generate {
            directory,
            challenge,
            pubkey,
            bit_length,
        } => {
            let challenge = parse_challenge(&challenge)?;
            let public_key = PublicKey::from_hex(&pubkey).context("parsing public key")?;

            // Auto-detect the on-disk format; the index must already exist
            let index = PlotIndex::open(&directory, &public_key, Ordinal::Unknown, bit_length)
                .context("opening index")?;
            let outcome =
                search(&index, &public_key.hash(), challenge).context("searching for proof")?;

            println!("Proof string: {}", outcome.proof.to_proof_string());
            println!(
                "Challenge was rehashed {} times for valid proof",
                outcome.rehashes
            );
        }

        Commands::Verify {
            proof,
            challenge,
            pubkey,
            bit_length,
        } => {
            let challenge = parse_challenge(&challenge)?;
            let public_key = PublicKey::from_hex(&pubkey).context("parsing public key")?;
            let proof =
                Proof::from_proof_string(&proof, bit_length).context("parsing proof string")?;

            match verify_proof(&proof, &public_key.hash(), &challenge) {
                Ok(()) => println!("Successful proof"),
                Err(e) if e.is_rejection() => println!("Unsuccessful proof"),
                Err(e) => return Err(e).context("verifying proof"),
            }
        }
    }

    Ok(())
}

fn parse_challenge(s: &str) -> Result<Hash> {
    Hash::from_hex(s).context("challenge must be 32 hex-encoded bytes")
}
