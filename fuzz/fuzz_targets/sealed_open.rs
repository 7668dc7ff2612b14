//! Fuzz target for sealed message opening
//!
//! Inbound channel lines are attacker-reachable before any authentication:
//! JSON parsing, base64 field decoding, and AES-GCM opening all run on
//! whatever arrives. This fuzzer tests that path with:
//! - Malformed JSON and wrong field types
//! - Truncated, empty, and oversized nonces and ciphertexts
//! - Ciphertexts shorter than the GCM tag
//! - Messages shaped correctly but sealed under no key at all
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_crypto::{SealedMessage, Session, Suite};
use tether_proto::{Envelope, open_and_decode};

#[derive(Debug, Arbitrary)]
struct RawSealed {
    kdf_nonce: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    additional_data: String,
}

fuzz_target!(|input: (&str, RawSealed)| {
    let (line, raw) = input;

    let mut receiver = Session::from_secret_bytes(Suite::Sha256, [0x11; 32]);
    let sender = Session::from_secret_bytes(Suite::Sha256, [0x22; 32]);
    if receiver.set_external_public_key(&sender.local_public_key()).is_err() {
        panic!("fixed test keys must pair");
    }

    // Wire path: arbitrary text through JSON parse, AEAD open, and
    // envelope decode. The predicate accepts everything so decode runs
    // whenever decryption somehow succeeds.
    let _ = open_and_decode::<Envelope, _>(&receiver, line, |_| true);

    // Field-level path: structured garbage straight into the AEAD open.
    let sealed = SealedMessage {
        kdf_nonce: raw.kdf_nonce,
        nonce: raw.nonce,
        ciphertext: raw.ciphertext,
        additional_data: raw.additional_data,
    };
    let _ = receiver.open(&sealed);

    // An unpaired session must refuse, never panic.
    let unpaired = Session::from_secret_bytes(Suite::Sha256, [0x33; 32]);
    assert!(unpaired.open(&sealed).is_err());
});
