//! Error types for the Massif library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Index format error: {0}")]
    IndexFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key {key} out of range for bit length {bit_length}")]
    KeyOutOfRange { key: u64, bit_length: usize },

    #[error("Record {key} not built")]
    NotBuilt { key: u64 },

    #[error("Proof encoding error: {0}")]
    ProofEncoding(String),

    #[error("Invalid proof bit length: {0}")]
    InvalidProofBitLength(usize),

    #[error("Invalid proof record: {0}")]
    InvalidProofRecord(String),

    #[error("Proof does not match challenge")]
    VerificationMiss,

    #[error("Plot failed: {0}")]
    PlotFailed(String),
}

impl Error {
    /// True for the outcomes the challenge search absorbs by rehashing:
    /// an empty plot slot or a proof that simply does not match. Everything
    /// else is a structural fault that must propagate.
    pub fn is_miss(&self) -> bool {
        matches!(self, Error::NotBuilt { .. } | Error::VerificationMiss)
    }

    /// True for verifier rejections that mean "this proof does not verify"
    /// rather than "the input could not be processed".
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::VerificationMiss
                | Error::InvalidProofBitLength(_)
                | Error::InvalidProofRecord(_)
        )
    }
}
