#![no_main]

use libfuzzer_sys::fuzz_target;
use massif_core::{scalar, Proof};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bit strings must never panic
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(bytes) = scalar::decode_bits(s) {
            // Re-encoding reproduces the input modulo stripped leading zeros
            let reencoded = scalar::encode_bits(&bytes);
            assert_eq!(scalar::decode_bits(&reencoded).unwrap(), bytes);
        }

        if let Ok(proof) = Proof::from_proof_string(s, 24) {
            let printed = proof.to_proof_string();
            let reparsed = Proof::from_proof_string(&printed, 24).unwrap();
            assert_eq!(reparsed, proof);
        }
    }

    // The canonical encoder round-trips any byte sequence exactly
    let encoded = scalar::encode_bits(data);
    assert_eq!(scalar::decode_bits(&encoded).unwrap(), data);
});
