//! Error types for the wire codec

use thiserror::Error;

/// Errors produced while sealing or opening wire messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be serialized to JSON.
    #[error("payload encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The outer text was not a valid sealed message.
    #[error("sealed message parse failed: {0}")]
    Parse(#[source] serde_json::Error),

    /// Sealing or opening failed at the crypto layer.
    #[error(transparent)]
    Crypto(#[from] tether_crypto::CryptoError),

    /// The caller's predicate rejected the authenticated additional data.
    #[error("additional data rejected by authentication predicate")]
    AuthRejected,

    /// The decrypted payload failed to decode.
    #[error("payload decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
