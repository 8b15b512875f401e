//! Proof generation, verification, and challenge search
//!
//! A proof is self-contained: (X, X', bit length). The verifier recomputes
//! the flip-pair and FB conditions against the public key commitment and
//! the challenge cut, with no access to the plot. Acceptance is
//! intentionally probabilistic per challenge, which is why mining rehashes
//! the challenge until a built slot verifies.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::PlotIndex;
use crate::scalar::{
    cut, decode_bits, domain_mask, encode_bits, f, fb, flip, sha256, value_from_bytes,
};
use crate::types::{Hash, Record};
use crate::{valid_bit_length, RECORD_FIELD_SIZE};

/// A compact capacity proof, transmissible without the plot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// X field bytes (little-endian)
    #[serde(with = "crate::types::hex_vec")]
    pub x: Vec<u8>,
    /// X' field bytes (little-endian)
    #[serde(with = "crate::types::hex_vec")]
    pub x_prime: Vec<u8>,
    /// Bit length of the index the proof was drawn from
    pub bit_length: usize,
}

impl Proof {
    /// Wrap a plotted record for an index of the given bit length
    pub fn from_record(record: Record, bit_length: usize) -> Self {
        Self {
            x: record.x.to_vec(),
            x_prime: record.x_prime.to_vec(),
            bit_length,
        }
    }

    /// Wire encoding: `<X-bits>,<X'-bits>`, each side an ASCII bit string
    pub fn to_proof_string(&self) -> String {
        format!("{},{}", encode_bits(&self.x), encode_bits(&self.x_prime))
    }

    /// Parse the wire encoding. The bit length is carried out of band.
    pub fn from_proof_string(s: &str, bit_length: usize) -> Result<Self> {
        let (x_bits, xp_bits) = s.split_once(',').ok_or_else(|| {
            Error::ProofEncoding("proof string must be '<X-bits>,<X'-bits>'".into())
        })?;
        if xp_bits.contains(',') {
            return Err(Error::ProofEncoding(
                "proof string has more than two fields".into(),
            ));
        }
        Ok(Self {
            x: decode_bits(x_bits)?,
            x_prime: decode_bits(xp_bits)?,
            bit_length,
        })
    }
}

/// Build a proof for `challenge` from an open index.
///
/// Propagates `get` failures unchanged: an out-of-range cut cannot happen
/// (the cut is masked to the index domain), but an unbuilt slot or an I/O
/// fault is the caller's to interpret. Never fabricates partial data.
pub fn generate_proof(index: &PlotIndex, challenge: &Hash) -> Result<Proof> {
    let key = cut(challenge, index.bit_length());
    let record = index.get(key)?;
    Ok(Proof::from_record(record, index.bit_length()))
}

/// Check a proof against a public key commitment and a challenge.
///
/// Pure function, no I/O: identical inputs always produce the identical
/// outcome. Accepts only on exact match of both protocol conditions:
/// `f(x) == flip(f(x'))` and `fb(x, x') == cut(challenge)`.
pub fn verify_proof(proof: &Proof, pk_hash: &Hash, challenge: &Hash) -> Result<()> {
    if !valid_bit_length(proof.bit_length) {
        return Err(Error::InvalidProofBitLength(proof.bit_length));
    }
    if proof.x.len() != RECORD_FIELD_SIZE || proof.x_prime.len() != RECORD_FIELD_SIZE {
        return Err(Error::InvalidProofRecord(format!(
            "fields are {}/{} bytes, expected {}",
            proof.x.len(),
            proof.x_prime.len(),
            RECORD_FIELD_SIZE
        )));
    }

    let bit_length = proof.bit_length;
    let x = value_from_bytes(&proof.x)?;
    let x_prime = value_from_bytes(&proof.x_prime)?;
    let mask = domain_mask(bit_length);
    if x > mask || x_prime > mask {
        return Err(Error::InvalidProofRecord(format!(
            "field value outside the {}-bit domain",
            bit_length
        )));
    }

    if f(x, bit_length, pk_hash) != flip(f(x_prime, bit_length, pk_hash), bit_length) {
        return Err(Error::VerificationMiss);
    }
    if fb(x, x_prime, bit_length, pk_hash) != cut(challenge, bit_length) {
        return Err(Error::VerificationMiss);
    }

    Ok(())
}

/// Result of a successful challenge search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The verifying proof
    pub proof: Proof,
    /// The (possibly rehashed) challenge the proof verifies against
    pub challenge: Hash,
    /// Number of rehashes consumed before the proof verified
    pub rehashes: u64,
}

/// Rehash `challenge` until a built record verifies against it.
///
/// Unbuilt slots and verification misses are the expected common case and
/// extend the loop; structural failures (out-of-range key, I/O, format)
/// propagate immediately.
pub fn search(index: &PlotIndex, pk_hash: &Hash, challenge: Hash) -> Result<SearchOutcome> {
    let mut challenge = challenge;
    let mut rehashes = 0u64;

    loop {
        let attempt = generate_proof(index, &challenge)
            .and_then(|proof| verify_proof(&proof, pk_hash, &challenge).map(|()| proof));
        match attempt {
            Ok(proof) => {
                return Ok(SearchOutcome {
                    proof,
                    challenge,
                    rehashes,
                })
            }
            Err(e) if e.is_miss() => {}
            Err(e) => return Err(e),
        }

        challenge = sha256(challenge.as_bytes());
        rehashes += 1;
    }
}
