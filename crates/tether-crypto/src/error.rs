//! Error types for session crypto

use thiserror::Error;

/// Errors produced by key handling and message sealing.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// An operation needed the peer's public key before it was learned.
    #[error("no external public key has been set for this session")]
    MissingExternalKey,

    /// The peer's public key produced an all-zero shared secret.
    #[error("external public key is non-contributory")]
    WeakExternalKey,

    /// A public key could not be decoded.
    #[error("invalid public key: {reason}")]
    InvalidKey {
        /// Why the key was rejected.
        reason: String,
    },

    /// A PEM block could not be parsed.
    #[error("invalid PEM block: {reason}")]
    InvalidPem {
        /// Why the block was rejected.
        reason: String,
    },

    /// AEAD authentication failed while opening a message.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Why decryption failed.
        reason: String,
    },
}
