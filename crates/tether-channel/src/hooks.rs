//! Callback surface for channel events.
//!
//! Hooks are plain synchronous closures invoked from the supervisor's
//! background tasks. Anything long-running belongs on the far side of a
//! channel; the hook itself should hand off and return.

use std::fmt;
use std::sync::Arc;

use crate::error::ChannelError;

/// Called with each raw inbound message (still sealed).
pub type MessageHook = Arc<dyn Fn(String) + Send + Sync>;
/// Called when a background task hits a non-fatal error.
pub type ErrorHook = Arc<dyn Fn(ChannelError) + Send + Sync>;
/// Called when the helper exits or a connection cycle aborts.
pub type ExitHook = Arc<dyn Fn(Option<ChannelError>) + Send + Sync>;
/// Called when the liveness watchdog fires.
pub type TimeoutHook = Arc<dyn Fn() + Send + Sync>;
/// Called with each chunk of helper stdout.
pub type StdoutHook = Arc<dyn Fn(String) + Send + Sync>;
/// Called once per cycle when the first inbound message arrives.
pub type ConnectedHook = Arc<dyn Fn() + Send + Sync>;

/// Event callbacks for one connection cycle.
///
/// Every hook defaults to a no-op, so callers register only what they
/// observe:
///
/// ```
/// use tether_channel::ChannelHooks;
///
/// let hooks = ChannelHooks::new()
///     .on_message(|text| tracing::info!(%text, "inbound"))
///     .on_timeout(|| tracing::warn!("peer went quiet"));
/// # drop(hooks);
/// ```
#[derive(Clone)]
pub struct ChannelHooks {
    pub(crate) message: MessageHook,
    pub(crate) error: ErrorHook,
    pub(crate) exit: ExitHook,
    pub(crate) timeout: TimeoutHook,
    pub(crate) stdout: StdoutHook,
    pub(crate) connected: ConnectedHook,
}

impl Default for ChannelHooks {
    fn default() -> Self {
        Self {
            message: Arc::new(|_| {}),
            error: Arc::new(|_| {}),
            exit: Arc::new(|_| {}),
            timeout: Arc::new(|| {}),
            stdout: Arc::new(|_| {}),
            connected: Arc::new(|| {}),
        }
    }
}

impl fmt::Debug for ChannelHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHooks").finish_non_exhaustive()
    }
}

impl ChannelHooks {
    /// A hook set where every callback is a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the inbound message callback.
    #[must_use]
    pub fn on_message(mut self, hook: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.message = Arc::new(hook);
        self
    }

    /// Registers the background error callback.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(ChannelError) + Send + Sync + 'static) -> Self {
        self.error = Arc::new(hook);
        self
    }

    /// Registers the helper exit callback.
    #[must_use]
    pub fn on_exit(mut self, hook: impl Fn(Option<ChannelError>) + Send + Sync + 'static) -> Self {
        self.exit = Arc::new(hook);
        self
    }

    /// Registers the liveness timeout callback.
    #[must_use]
    pub fn on_timeout(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.timeout = Arc::new(hook);
        self
    }

    /// Registers the helper stdout callback.
    #[must_use]
    pub fn on_stdout(mut self, hook: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.stdout = Arc::new(hook);
        self
    }

    /// Registers the first-message callback.
    #[must_use]
    pub fn on_connected(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected = Arc::new(hook);
        self
    }
}
