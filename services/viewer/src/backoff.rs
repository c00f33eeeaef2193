//! Capped exponential backoff
//!
//! Delay doubles per consecutive failure from a base, saturating at a cap,
//! and resets to the base after any success. The push and poll transports
//! use the same policy with different caps.

use std::time::Duration;

#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: 0,
        }
    }

    /// Record a failure and return the delay to wait before retrying.
    ///
    /// The first failure waits the base delay.
    pub fn next_delay(&mut self) -> Duration {
        // Exponent clamp keeps the shift in range; the cap dominates far
        // earlier for any realistic configuration.
        let exponent = self.failures.min(16);
        let delay = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.cap);
        self.failures += 1;
        delay
    }

    /// Clear the failure streak after a success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
