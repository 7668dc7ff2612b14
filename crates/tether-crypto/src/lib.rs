//! Tether Cryptographic Sessions
//!
//! Key exchange and message sealing for supervised channels. A [`Session`]
//! holds a local X25519 identity; once the peer's public key is learned, the
//! session derives per-message AES-256-GCM keys via HKDF and can seal and
//! open messages.
//!
//! ```text
//! X25519 Diffie-Hellman (static per session)
//!        │
//!        ▼
//! HKDF, salted with a fresh per-message nonce → Message Key
//!        │
//!        ▼
//! AES-256-GCM → SealedMessage { kdf_nonce, nonce, ciphertext, additional_data }
//! ```
//!
//! Each sealed message carries its own 32-byte HKDF salt, so every
//! ciphertext is encrypted under a distinct key even though the underlying
//! Diffie-Hellman secret is fixed for the lifetime of the session.
//!
//! # Key distribution
//!
//! The two halves of a pairing learn each other's keys asymmetrically:
//!
//! - The supervisor hands its public key to the helper process as a
//!   command-line bearer token (single-line base64).
//! - The helper announces its public key by printing a PEM block to stdout,
//!   which the supervisor scans out of the output stream (see [`pem`]).
//!
//! # Security
//!
//! - `additional_data` travels in the clear but is bound by the GCM tag;
//!   tampering with it fails the open.
//! - Non-contributory peer keys (all-zero shared secret) are rejected when
//!   installed, not at first use.
//! - Shared secrets and derived keys are zeroized on drop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod pem;
mod session;

pub use error::CryptoError;
pub use session::{
    AEAD_NONCE_SIZE, KDF_NONCE_SIZE, SealedMessage, Session, SessionFactory, Suite, suite_factory,
};
pub use x25519_dalek::PublicKey;
