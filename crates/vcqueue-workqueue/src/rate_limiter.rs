//! Per-item failure rate limiting
//!
//! A rate limiter decides how long a failed item waits before it is handed
//! out again, and remembers how many times each item has failed so the caller
//! can cap retries.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;

/// Base delay of the default controller rate limiter
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Maximum delay of the default controller rate limiter
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Decides the backoff for an item that failed processing.
pub trait RateLimiter<T>: Send + Sync {
    /// Record a failure for `item` and return how long to wait before retrying
    fn when(&self, item: &T) -> Duration;

    /// Stop tracking `item`; its next failure starts from the base delay again
    fn forget(&self, item: &T);

    /// Number of failures recorded for `item` since it was last forgotten
    fn num_requeues(&self, item: &T) -> u32;
}

/// Exponential per-item backoff: `base * 2^failures`, capped at `max`.
///
/// With the default 5ms base an item is retried after
/// 5ms, 10ms, 20ms, 40ms, ... until the cap is reached.
pub struct ItemExponentialFailureRateLimiter<T> {
    base_delay: Duration,
    max_delay: Duration,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T> ItemExponentialFailureRateLimiter<T>
where
    T: Eq + Hash + Clone,
{
    /// Create a limiter with the given base and maximum delay
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl<T> Default for ItemExponentialFailureRateLimiter<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl<T> RateLimiter<T> for ItemExponentialFailureRateLimiter<T>
where
    T: Eq + Hash + Clone + Send + Sync,
{
    fn when(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(item.clone()).or_insert(0);
        let attempt = *count;
        *count = count.saturating_add(1);
        self.backoff(attempt)
    }

    fn forget(&self, item: &T) {
        self.failures.lock().remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.failures.lock().get(item).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_failure() {
        let limiter = ItemExponentialFailureRateLimiter::default();
        let delays: Vec<_> = (0..5).map(|_| limiter.when(&"q")).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );
        assert_eq!(limiter.num_requeues(&"q"), 5);
    }

    #[test]
    fn backoff_is_capped() {
        let limiter =
            ItemExponentialFailureRateLimiter::new(Duration::from_secs(1), Duration::from_secs(3));
        let delays: Vec<_> = (0..4).map(|_| limiter.when(&1)).collect();
        assert_eq!(delays[2], Duration::from_secs(3));
        assert_eq!(delays[3], Duration::from_secs(3));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let limiter = ItemExponentialFailureRateLimiter::<u8>::default();
        assert_eq!(limiter.backoff(64), DEFAULT_MAX_DELAY);
        assert_eq!(limiter.backoff(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn items_are_tracked_independently() {
        let limiter = ItemExponentialFailureRateLimiter::default();
        limiter.when(&"a");
        limiter.when(&"a");
        assert_eq!(limiter.when(&"b"), DEFAULT_BASE_DELAY);
        assert_eq!(limiter.num_requeues(&"a"), 2);
        assert_eq!(limiter.num_requeues(&"b"), 1);
    }

    #[test]
    fn forget_resets_backoff() {
        let limiter = ItemExponentialFailureRateLimiter::default();
        limiter.when(&"a");
        limiter.when(&"a");
        limiter.forget(&"a");
        assert_eq!(limiter.num_requeues(&"a"), 0);
        assert_eq!(limiter.when(&"a"), DEFAULT_BASE_DELAY);
    }
}
