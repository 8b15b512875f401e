//! Scalar hash utilities
//!
//! Truncation of 32-byte digests into bounded plot keys, the F/FB scoring
//! functions shared by the plotter and the verifier, and the ASCII
//! bit-string codec used for the proof wire format.
//!
//! All of these are protocol constants: the prover and verifier must agree
//! byte-for-byte, across processes and versions.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::{Hash, PoCValue};
use crate::RECORD_FIELD_SIZE;

/// SHA-256 of a byte sequence
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    Hash::new(digest.into())
}

/// Double SHA-256 of a byte sequence
pub fn sha256d(data: &[u8]) -> Hash {
    sha256(sha256(data).as_bytes())
}

/// Mask covering the low `bit_length` bits of the key domain
pub fn domain_mask(bit_length: usize) -> u64 {
    (1u64 << bit_length) - 1
}

/// Truncate a 32-byte digest to a plot key in [0, 2^bit_length).
///
/// The rule is fixed: the first 8 digest bytes read as a little-endian u64,
/// masked to the low `bit_length` bits.
pub fn cut(hash: &Hash, bit_length: usize) -> PoCValue {
    let mut word = [0u8; 8];
    word.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(word) & domain_mask(bit_length)
}

/// Bit-flip of a value within the `bit_length`-bit domain
pub fn flip(value: PoCValue, bit_length: usize) -> PoCValue {
    value ^ domain_mask(bit_length)
}

/// Little-endian encoding of a record field
pub fn value_to_bytes(value: PoCValue) -> [u8; RECORD_FIELD_SIZE] {
    value.to_le_bytes()
}

/// Decode a record field; the slice must be exactly one field wide
pub fn value_from_bytes(bytes: &[u8]) -> Result<PoCValue> {
    if bytes.len() != RECORD_FIELD_SIZE {
        return Err(Error::InvalidProofRecord(format!(
            "field is {} bytes, expected {}",
            bytes.len(),
            RECORD_FIELD_SIZE
        )));
    }
    let mut word = [0u8; RECORD_FIELD_SIZE];
    word.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(word))
}

/// F(x): cut(SHA256(pk_hash || x), bit_length)
pub fn f(x: PoCValue, bit_length: usize, pk_hash: &Hash) -> PoCValue {
    let mut raw = [0u8; 32 + RECORD_FIELD_SIZE];
    raw[..32].copy_from_slice(pk_hash.as_bytes());
    raw[32..].copy_from_slice(&value_to_bytes(x));
    cut(&sha256(&raw), bit_length)
}

/// FB(x, x'): cut(SHA256(pk_hash || x || x'), bit_length)
pub fn fb(x: PoCValue, x_prime: PoCValue, bit_length: usize, pk_hash: &Hash) -> PoCValue {
    let mut raw = [0u8; 32 + 2 * RECORD_FIELD_SIZE];
    raw[..32].copy_from_slice(pk_hash.as_bytes());
    raw[32..40].copy_from_slice(&value_to_bytes(x));
    raw[40..].copy_from_slice(&value_to_bytes(x_prime));
    cut(&sha256(&raw), bit_length)
}

/// Encode bytes as an ASCII bit string: eight '0'/'1' chars per byte, most
/// significant bit first, bytes concatenated high-to-low.
pub fn encode_bits(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8);
    for b in bytes {
        for shift in (0..8).rev() {
            out.push(if (b >> shift) & 1 == 1 { '1' } else { '0' });
        }
    }
    out
}

/// Decode an ASCII bit string back into bytes.
///
/// Groups of eight chars are consumed from the end of the string, so a
/// leading partial group becomes the first byte (matching the wire format's
/// tolerance for stripped leading zero bits).
pub fn decode_bits(s: &str) -> Result<Vec<u8>> {
    if !s.bytes().all(|c| c == b'0' || c == b'1') {
        return Err(Error::ProofEncoding(
            "bit string may only contain '0' and '1'".into(),
        ));
    }
    let bits = s.as_bytes();
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    let mut byte_idx = out.len();
    let mut end = bits.len();
    while end > 0 {
        let start = end.saturating_sub(8);
        let mut byte = 0u8;
        for &c in &bits[start..end] {
            byte = (byte << 1) | (c - b'0');
        }
        byte_idx -= 1;
        out[byte_idx] = byte;
        end = start;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cut_is_deterministic_and_bounded() {
        let h = sha256(b"challenge");
        for bl in [8, 12, 24, 40] {
            let v = cut(&h, bl);
            assert_eq!(v, cut(&h, bl));
            assert!(v < (1u64 << bl));
        }
    }

    #[test]
    fn test_cut_is_little_endian_on_first_eight_bytes() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[1] = 0x02;
        // Bytes past the eighth must not contribute
        bytes[8] = 0xff;
        let v = cut(&Hash::new(bytes), 40);
        assert_eq!(v, 0x0201);
    }

    #[test]
    fn test_flip_is_an_involution() {
        for bl in [8, 16, 24] {
            for v in [0u64, 1, 100, domain_mask(bl)] {
                assert_eq!(flip(flip(v, bl), bl), v);
                assert!(flip(v, bl) <= domain_mask(bl));
            }
        }
    }

    #[test]
    fn test_value_codec() {
        let v = 0x0123_4567_89ab_cdefu64;
        assert_eq!(value_from_bytes(&value_to_bytes(v)).unwrap(), v);
        assert!(value_from_bytes(&[0u8; 7]).is_err());
        assert!(value_from_bytes(&[0u8; 9]).is_err());
    }

    #[test]
    fn test_f_and_fb_depend_on_pk_hash() {
        let a = sha256(b"a");
        let b = sha256(b"b");
        assert_ne!(f(7, 24, &a), f(7, 24, &b));
        assert_ne!(fb(7, 9, 24, &a), fb(7, 9, 24, &b));
    }

    #[test]
    fn test_encode_bits_known_values() {
        assert_eq!(encode_bits(&[]), "");
        assert_eq!(encode_bits(&[0x00]), "00000000");
        assert_eq!(encode_bits(&[0xa5]), "10100101");
        assert_eq!(encode_bits(&[0x01, 0x80]), "0000000110000000");
    }

    #[test]
    fn test_decode_bits_partial_leading_group() {
        // A stripped leading zero group still decodes to the same bytes
        assert_eq!(decode_bits("110000000").unwrap(), vec![0x01, 0x80]);
        assert_eq!(decode_bits("1").unwrap(), vec![0x01]);
        assert_eq!(decode_bits("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_bits_rejects_non_binary() {
        assert!(decode_bits("01012").is_err());
        assert!(decode_bits("abc").is_err());
    }

    proptest! {
        #[test]
        fn prop_bit_codec_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let encoded = encode_bits(&bytes);
            prop_assert_eq!(decode_bits(&encoded).unwrap(), bytes);
        }

        #[test]
        fn prop_cut_stays_in_domain(bytes in any::<[u8; 32]>(), bl in 8usize..=40) {
            let v = cut(&Hash::new(bytes), bl);
            prop_assert!(v < (1u64 << bl));
        }
    }
}
