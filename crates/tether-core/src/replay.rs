//! Timestamp replay guard.
//!
//! Messages carry their send time (Unix milliseconds, decimal string) as
//! authenticated additional data. The guard accepts a message only when its
//! timestamp is strictly newer than the last accepted one AND close enough
//! to the local clock. Single-guard state means duplicated, reordered, and
//! replayed messages all fail the strictly-newer check, while the jitter
//! window bounds how far a recorded message can be re-sent later.

/// Default tolerated clock skew between sender and receiver (milliseconds).
pub const DEFAULT_REPLAY_WINDOW_MS: i64 = 10;

/// Replay protection over authenticated message timestamps.
///
/// Pure state machine: the caller supplies the current wall-clock millis,
/// so tests control time completely. Rejections never modify state.
#[derive(Debug, Clone)]
pub struct ReplayGuard {
    window_ms: i64,
    last_accepted: i64,
}

impl ReplayGuard {
    /// Create a guard with the given jitter window in milliseconds.
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms, last_accepted: 0 }
    }

    /// The configured jitter window in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Retune the jitter window, keeping the last accepted timestamp.
    pub fn set_window(&mut self, window_ms: i64) {
        self.window_ms = window_ms;
    }

    /// The most recently accepted timestamp, or 0 before any acceptance.
    pub fn last_accepted(&self) -> i64 {
        self.last_accepted
    }

    /// Check a message timestamp against `now_ms` and record it on success.
    ///
    /// `additional_data` must be a decimal Unix-milliseconds string. Returns
    /// false (leaving state untouched) when it is non-numeric, not strictly
    /// newer than the last accepted timestamp, from the future, or older
    /// than `now_ms` minus the window.
    pub fn accept(&mut self, additional_data: &str, now_ms: i64) -> bool {
        let Ok(timestamp) = additional_data.parse::<i64>() else {
            return false;
        };

        if timestamp <= self.last_accepted {
            return false;
        }

        let delta = now_ms - timestamp;
        if delta < 0 || delta > self.window_ms {
            return false;
        }

        self.last_accepted = timestamp;
        true
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW_MS)
    }
}
