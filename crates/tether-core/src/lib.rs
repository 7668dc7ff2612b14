//! Tether Supervision Core
//!
//! Pure state machines backing the channel supervisor. Nothing in this crate
//! performs I/O or reads clocks: time arrives as method parameters, effects
//! leave as return values, and the driver crate (`tether-channel`) wires both
//! to the real world. This keeps every guard deterministic and directly
//! testable.
//!
//! # Components
//!
//! - [`ReplayGuard`]: strictly increasing timestamp check with a jitter window
//! - [`FailureCounter`]: consecutive decrypt-failure count with a single-shot trip
//! - [`LivenessWatchdog`]: deadline arithmetic for the ping timeout
//! - [`KeyRotationWatcher`]: scans helper stdout for in-band key announcements
//! - [`ChannelConfig`]: validated configuration and helper argument bindings
//! - [`Environment`]: the time/randomness seam between logic and drivers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod env;
mod error;
mod failure;
mod phase;
mod replay;
mod rotation;
mod watchdog;

pub use config::{ArgumentBindings, ArgumentSource, BindingContext, ChannelConfig, ConnectRequest};
pub use env::Environment;
pub use error::ConfigError;
pub use failure::{DEFAULT_FAILURE_THRESHOLD, FailureCounter};
pub use phase::ChannelPhase;
pub use replay::{DEFAULT_REPLAY_WINDOW_MS, ReplayGuard};
pub use rotation::{KeyRotationWatcher, RotationScan};
pub use watchdog::{DEFAULT_PING_TIME_LIMIT, LivenessWatchdog};
