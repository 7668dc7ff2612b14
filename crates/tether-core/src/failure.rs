//! Consecutive decrypt-failure counting.

/// Default number of consecutive failures that trips recovery.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// Counts consecutive decrypt failures and trips once at the threshold.
///
/// Any successful decrypt zeroes the count, so only an unbroken run of
/// failures can trip. The trip itself also zeroes the count: reaching the
/// threshold produces exactly one trip, and the next trip needs a full new
/// run.
#[derive(Debug, Clone)]
pub struct FailureCounter {
    threshold: u32,
    count: u32,
}

impl FailureCounter {
    /// Create a counter that trips after `threshold` consecutive failures.
    pub fn new(threshold: u32) -> Self {
        Self { threshold, count: 0 }
    }

    /// Current run length of consecutive failures.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Record one failure. Returns true when this failure trips recovery.
    pub fn record_failure(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            return true;
        }
        false
    }

    /// Record one success, breaking the failure run.
    pub fn record_success(&mut self) {
        self.count = 0;
    }
}

impl Default for FailureCounter {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}
