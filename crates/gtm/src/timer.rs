//! Retry scheduling.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Computes when a transaction becomes due for its next retry.
///
/// The contract is pure: no state, no side effects. Any monotone back-off
/// policy satisfies it, provided the result is never earlier than
/// `now + min_interval`.
pub trait RetryTimer: Send + Sync {
    fn next_retry_at(&self, times: u32, min_interval: Duration) -> DateTime<Utc>;
}

/// Exponential back-off: `now + max(2^times seconds, min_interval)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleTimer;

impl RetryTimer for DoubleTimer {
    fn next_retry_at(&self, times: u32, min_interval: Duration) -> DateTime<Utc> {
        // Shift capped so the chrono addition below stays in range.
        let backoff = Duration::from_secs(1u64 << times.min(36));
        Utc::now() + backoff.max(min_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_earlier_than_min_interval() {
        let timer = DoubleTimer;
        let min_interval = Duration::from_secs(60);

        for times in [0, 1, 2, 5, 10, 40, 100] {
            let before = Utc::now();
            let at = timer.next_retry_at(times, min_interval);
            assert!(
                at >= before + min_interval,
                "times={times}: {at} is earlier than {before} + 60s"
            );
        }
    }

    #[test]
    fn backoff_doubles_past_the_minimum() {
        let timer = DoubleTimer;
        let min_interval = Duration::from_secs(1);

        let at3 = timer.next_retry_at(3, min_interval);
        let at4 = timer.next_retry_at(4, min_interval);

        // 2^3 = 8s vs 2^4 = 16s; the gap dominates clock jitter.
        assert!(at4 - at3 >= chrono::Duration::seconds(7));
    }

    #[test]
    fn large_attempt_counts_do_not_overflow() {
        let timer = DoubleTimer;
        let at = timer.next_retry_at(u32::MAX, Duration::from_secs(60));
        assert!(at > Utc::now());
    }
}
