//! Tether Wire Protocol
//!
//! The message layer between a channel supervisor and its helper process.
//! Everything on the wire is line-delimited JSON in two layers:
//!
//! ```text
//! Envelope { type, id, data }          application payload
//!        │ serde_json
//!        ▼
//! Session::seal                        AES-256-GCM + additional data
//!        │
//!        ▼
//! SealedMessage { kdf_nonce, nonce, ciphertext, additional_data }
//! ```
//!
//! [`encode_and_seal`] and [`open_and_decode`] compose the two layers. The
//! open path runs in a fixed order: decrypt first (which authenticates the
//! additional data), then hand the now-trustworthy additional data to the
//! caller's predicate, then decode the payload. Replay state held by the
//! predicate is therefore never advanced by forged input.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod codec;
mod envelope;
mod error;

pub use codec::{encode_and_seal, open_and_decode};
pub use envelope::Envelope;
pub use error::CodecError;
