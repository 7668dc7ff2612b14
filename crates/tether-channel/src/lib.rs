//! Tether Channel Supervisor
//!
//! Spawns a helper process, opens an encrypted socket channel to it, and
//! supervises both until told to stop. The owner talks to the channel
//! through a [`Supervisor`]; everything else (helper lifecycle, dialing,
//! key exchange, liveness) happens in background tasks.
//!
//! ```text
//!  owner                     supervisor                    helper process
//!    |                           |                               |
//!    | connect_with_helper ----> | spawn -key=value args ------> |
//!    |                           | dial addr:port . . . . . . .  | (listening)
//!    |                           | CONNECT <path> <bearer> ----> |
//!    |                           | <---------------- PEM stdout  |
//!    |                           |   adopt helper public key     |
//!    | <---- on_connected        | <---- sealed status lines     |
//!    | decrypt_and_decode        |                               |
//!    | publish ----------------> | sealed envelope ------------> |
//!    |                           |                               |
//! ```
//!
//! Each connect call starts a fresh cycle with its own session keys and
//! its own [`ChannelHandle`]; handles from earlier cycles are refused.
//! Liveness timeouts, rejected key rotations, and repeated decrypt
//! failures reset the cycle, which rebuilds itself when
//! [`ChannelConfig::retry_on_exit`] is set.
//!
//! # Example
//!
//! ```no_run
//! use tether_channel::{ChannelConfig, ChannelHooks, Suite, Supervisor, suite_factory};
//!
//! # async fn demo() -> Result<(), tether_channel::ChannelError> {
//! let config = ChannelConfig {
//!     port: Some(9300),
//!     helper_bin: Some("/usr/local/libexec/tether-helper".into()),
//!     watch_key_rotation: true,
//!     ..ChannelConfig::default()
//! };
//! let supervisor = Supervisor::with_system_env(config, suite_factory(Suite::Sha256));
//!
//! let channel = supervisor.clone();
//! supervisor.connect_with_helper(
//!     ChannelHooks::new()
//!         .on_message(move |sealed| {
//!             if let Ok(envelope) =
//!                 channel.decrypt_and_decode::<tether_channel::Envelope>(&sealed)
//!             {
//!                 tracing::info!(kind = %envelope.kind, data = %envelope.data, "update");
//!             }
//!         })
//!         .on_timeout(|| tracing::warn!("helper went quiet")),
//! )?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod hooks;
mod process;
mod supervisor;
mod system_env;
mod transport;

pub use error::ChannelError;
pub use hooks::{
    ChannelHooks, ConnectedHook, ErrorHook, ExitHook, MessageHook, StdoutHook, TimeoutHook,
};
pub use supervisor::{ChannelHandle, Supervisor};
pub use system_env::SystemEnv;
pub use transport::TransportError;

pub use tether_core::{ChannelConfig, ChannelPhase, ConfigError, ConnectRequest, Environment};
pub use tether_crypto::{CryptoError, Session, SessionFactory, Suite, suite_factory};
pub use tether_proto::{CodecError, Envelope};
