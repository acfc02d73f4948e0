use std::time::Duration;

/// Exponential backoff schedule for transient HTTP failures (429, 5xx, truncated bodies).
///
/// The delay before retry `n` (0-based) is `base_delay * 2^n`: 1s, 2s, 4s with the
/// default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Never retry.
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_large_retry_does_not_overflow() {
        let policy = RetryPolicy::new(100, Duration::from_secs(u64::MAX / 2));
        let _ = policy.delay_for(99);
    }
}
