//! Massif Core - Plot file format and proof primitives for proof-of-capacity mining
//!
//! This crate provides the persistent plot index (a direct-addressed on-disk
//! record array), the background plot builder, and the proof
//! generation/verification protocol that ties plotted records to a committed
//! public key and an arbitrary challenge.

pub mod crypto;
pub mod error;
pub mod index;
pub mod plot;
pub mod proof;
pub mod scalar;
pub mod types;

pub use crypto::PublicKey;
pub use error::{Error, Result};
pub use index::{IndexHeader, Ordinal, PlotIndex, HEADER_SIZE, INDEX_MAGIC};
pub use plot::{PlotHandle, PlotOutcome, StopHandle};
pub use proof::{generate_proof, search, verify_proof, Proof, SearchOutcome};
pub use types::{Hash, PoCValue, Record};

/// Smallest supported plot bit length
pub const MIN_BIT_LENGTH: usize = 8;

/// Largest supported plot bit length (2^40 records)
pub const MAX_BIT_LENGTH: usize = 40;

/// Size in bytes of each record field (X or X') on disk and on the wire.
/// A protocol constant, independent of the plot bit length.
pub const RECORD_FIELD_SIZE: usize = 8;

/// Returns true if `bit_length` is within the supported plot domain.
pub fn valid_bit_length(bit_length: usize) -> bool {
    (MIN_BIT_LENGTH..=MAX_BIT_LENGTH).contains(&bit_length)
}
