//! Public key handling for Massif
//!
//! Plots are committed to a secp256k1 public key. Only the compressed SEC1
//! encoding and a double-SHA256 commitment of it are used by the protocol;
//! the key is never used for signing here.

use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::{Error, Result};
use crate::scalar::sha256;
use crate::types::Hash;

/// A parsed secp256k1 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(k256::PublicKey);

impl PublicKey {
    /// Parse a compressed SEC1 public key (33 bytes), rejecting points not
    /// on the curve
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let pk = k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| Error::Crypto(format!("Invalid public key: {}", e)))?;
        Ok(Self(pk))
    }

    /// Parse from a hex-encoded compressed SEC1 key
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::Crypto(format!("Invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Canonical compressed SEC1 encoding (33 bytes)
    pub fn serialize_compressed(&self) -> [u8; 33] {
        let point = self.0.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Hex of the canonical compressed encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize_compressed())
    }

    /// Public key commitment: SHA256(SHA256(compressed)). This is the value
    /// a verifier binds proofs to without seeing the plot.
    pub fn hash(&self) -> Hash {
        let inner = sha256(&self.serialize_compressed());
        sha256(inner.as_bytes())
    }
}
