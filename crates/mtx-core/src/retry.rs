use std::time::Duration;

/// Delay applied between consecutive failed sync attempts.
///
/// The delay doubles per consecutive failure, is capped at `max_delay`, and is
/// never shorter than a server-provided retry hint (still capped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Re-issue failed requests without waiting.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint: Option<Duration>) -> Duration {
        let shift = attempt.min(20);
        let calculated = self.base_delay.saturating_mul(1_u32 << shift);
        let hinted = retry_after_hint.unwrap_or(Duration::ZERO);
        calculated.max(hinted).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}
