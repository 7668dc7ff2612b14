//! Liveness watchdog over inbound traffic.
//!
//! Every delivered message doubles as proof of helper liveness, so the
//! watchdog is fed by message arrivals rather than a dedicated ping frame.
//! Pure deadline arithmetic: the driver owns the timer loop and passes time
//! in, mirroring the rest of this crate.

use std::{ops::Sub, time::Duration};

/// Default time without traffic before the watchdog fires.
pub const DEFAULT_PING_TIME_LIMIT: Duration = Duration::from_secs(65);

/// Tracks time since the last sign of life from the peer.
///
/// Generic over the instant type so virtual clocks work in tests. A zero
/// limit disables the watchdog entirely.
#[derive(Debug, Clone)]
pub struct LivenessWatchdog<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    limit: Duration,
    last_activity: I,
}

impl<I> LivenessWatchdog<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a watchdog whose clock starts at `now`.
    pub fn new(limit: Duration, now: I) -> Self {
        Self { limit, last_activity: now }
    }

    /// Whether this watchdog can ever fire.
    pub fn is_disabled(&self) -> bool {
        self.limit.is_zero()
    }

    /// The configured limit.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Record a sign of life (a delivered message or an explicit pong).
    pub fn mark_alive(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Elapsed time since last activity, if the limit has been reached.
    /// `None` while healthy or disabled.
    pub fn expired(&self, now: I) -> Option<Duration> {
        if self.is_disabled() {
            return None;
        }

        let elapsed = self.elapsed(now);
        if elapsed >= self.limit { Some(elapsed) } else { None }
    }

    /// Time until the watchdog would fire absent further activity.
    /// `None` when disabled; zero when already expired.
    pub fn remaining(&self, now: I) -> Option<Duration> {
        if self.is_disabled() {
            return None;
        }

        Some(self.limit.saturating_sub(self.elapsed(now)))
    }

    fn elapsed(&self, now: I) -> Duration {
        if now > self.last_activity { now - self.last_activity } else { Duration::ZERO }
    }
}
