//! Production environment backed by the system clock and OS entropy.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tether_core::Environment;
use tokio::time::Instant;

/// Production [`Environment`] using real time and OS randomness.
///
/// Monotonic readings come from [`tokio::time::Instant`], so supervisors
/// driven by this environment honor the paused test clock under
/// `#[tokio::test(start_paused = true)]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buf: &mut [u8]) {
        getrandom::fill(buf).expect("invariant: OS entropy source must be available");
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> i64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("invariant: system clock is after the Unix epoch");
        i64::try_from(since_epoch.as_millis())
            .expect("invariant: wall clock fits in 64-bit milliseconds")
    }
}
