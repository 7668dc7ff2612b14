//! Error types for channel configuration.

use thiserror::Error;

/// Errors found while validating a [`crate::ChannelConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The transport address is empty.
    #[error("transport address is empty")]
    EmptyAddress,

    /// No port was configured for the transport endpoint.
    #[error("no transport port configured")]
    MissingPort,

    /// A helper launch was requested but no binary path is configured.
    #[error("no helper binary configured")]
    MissingHelperBinary,

    /// The replay jitter window is negative.
    #[error("replay window must be non-negative, got {window_ms} ms")]
    NegativeReplayWindow {
        /// The rejected window value.
        window_ms: i64,
    },
}
