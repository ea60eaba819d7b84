use std::time::Duration;

use rand::Rng;

const MAX_BACKOFF_JITTER_MS: u64 = 250;

/// Exponential backoff policy applied to transient request failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based), jittered so that
    /// repeated runs do not synchronize.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..MAX_BACKOFF_JITTER_MS));
        backoff + jitter
    }

    pub fn attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JITTER: Duration = Duration::from_millis(MAX_BACKOFF_JITTER_MS);

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        for attempt in 0..3 {
            let expected = policy.base_delay * 2u32.pow(attempt);
            let delay = policy.delay_for(attempt);
            assert!(delay >= expected);
            assert!(delay < expected + JITTER);
        }
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(30);
        assert!(delay < policy.max_delay + JITTER);
    }

    #[test]
    fn attempt_ceiling() {
        let policy = RetryPolicy::default();
        assert!(policy.attempts_left(0));
        assert!(policy.attempts_left(2));
        assert!(!policy.attempts_left(3));
    }
}
