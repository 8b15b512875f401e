#![no_main]

use libfuzzer_sys::fuzz_target;
use massif_core::{IndexHeader, HEADER_SIZE};

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary header pages must never panic
    if let Ok(header) = IndexHeader::from_bytes(data) {
        // Anything accepted must survive a round-trip
        assert!(data.len() >= HEADER_SIZE);
        let reserialized = header.to_bytes();
        let reparsed = IndexHeader::from_bytes(&reserialized).unwrap();
        assert_eq!(reparsed, header);
    }
});
