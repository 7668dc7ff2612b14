//! Error types for channel supervision.

use tether_core::ConfigError;
use tether_crypto::CryptoError;
use tether_proto::CodecError;

use crate::transport::TransportError;

/// Errors surfaced by [`Supervisor`](crate::Supervisor) operations and hooks.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Channel configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A cryptographic session operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An outbound payload could not be encoded and sealed.
    #[error("failed to encode outbound payload: {0}")]
    Encode(#[source] CodecError),

    /// An inbound payload could not be opened and decoded.
    #[error("failed to decrypt inbound payload: {0}")]
    DecryptAndDecode(#[source] CodecError),

    /// The socket transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A key block seen on helper output was rejected.
    #[error("key rotation rejected: {reason}")]
    KeyRotation {
        /// Why the announced key was not adopted.
        reason: String,
    },

    /// The handle belongs to an earlier connection cycle.
    #[error("channel handle is stale")]
    StaleHandle,

    /// The operation needs an established session and none exists.
    #[error("channel is not connected")]
    NotConnected,

    /// The helper process could not be started.
    #[error("failed to spawn helper: {reason}")]
    Spawn {
        /// Operating system error description.
        reason: String,
    },

    /// The helper process exited without being asked to.
    #[error("helper exited with status {status:?}")]
    HelperExit {
        /// Exit code, or `None` when the helper was killed by a signal.
        status: Option<i32>,
    },
}
