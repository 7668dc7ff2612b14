//! Tether Helper
//!
//! Reference helper process for the tether channel: a small status
//! tracker that a host supervises over an encrypted socket. It exists to
//! exercise the full channel contract end to end, and as the template
//! for real helpers:
//!
//! 1. parse `-key=value` launch arguments (`-port`, `-token`, `-pid`,
//!    `-addr`)
//! 2. adopt the host's public key from `-token`
//! 3. print our own public key as a PEM block on stdout
//! 4. listen, check each client's `CONNECT` bearer, and exchange sealed
//!    lines
//! 5. exit when the watched host process disappears
//!
//! Library form so the binary stays thin and the wire behavior is
//! testable in process.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod args;
pub mod server;
pub mod store;

pub use args::{ArgError, LaunchArgs, USAGE, parse_args};
pub use server::{HelperError, run};
pub use store::{StatusEntry, StatusStore};
