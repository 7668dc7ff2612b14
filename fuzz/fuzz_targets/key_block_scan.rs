//! Fuzz target for PEM public key scanning
//!
//! The supervisor scans raw helper stdout for key blocks, so the scanner
//! sees arbitrary text: log noise, partial blocks, binary garbage decoded
//! lossily. This fuzzer tests scanning and parsing with:
//! - Markers without bodies, bodies without markers
//! - Repeated and interleaved BEGIN/END markers
//! - Non-base64 bodies and wrong-length keys
//! - Kilobytes of noise around an otherwise valid block
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error
//! or no block at all.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_core::{KeyRotationWatcher, RotationScan};
use tether_crypto::pem;

fuzz_target!(|text: &str| {
    match pem::find_block(text) {
        Some(block) => {
            // A found block carries both markers by construction.
            assert!(block.starts_with(pem::BEGIN_MARKER));
            assert!(block.ends_with(pem::END_MARKER));

            if let Ok(key) = pem::parse_public_key(block) {
                // Whatever parses must survive a re-encode round trip.
                let reencoded = pem::encode_public_key(&key);
                match pem::parse_public_key(&reencoded) {
                    Ok(reparsed) => assert_eq!(reparsed.as_bytes(), key.as_bytes()),
                    Err(error) => panic!("re-encoded block failed to parse: {error}"),
                }
            }
        }
        None => {
            // No complete block anywhere means the raw text cannot parse.
            assert!(pem::parse_public_key(text).is_err());
        }
    }

    // The stdout watcher wraps the same scan; a reported key implies a
    // complete block was present.
    let watcher = KeyRotationWatcher::new(true);
    match watcher.scan(text) {
        RotationScan::Key(_) => assert!(pem::find_block(text).is_some()),
        RotationScan::NoBlock | RotationScan::Malformed(_) => {}
    }

    // A disabled watcher reports nothing, whatever the input.
    let disabled = KeyRotationWatcher::new(false);
    assert!(matches!(disabled.scan(text), RotationScan::NoBlock));

    // Bearer-token form: bare base64 without markers.
    let _ = pem::decode_base64_key(text);
});
