//! # Fibonacci Backoff
//!
//! Requeue delays for failed reconciliations follow a Fibonacci sequence,
//! which grows more slowly than exponential backoff and suits operations
//! that may need several retries (a scan waiting for another to finish)
//! without hammering the apiserver.
//!
//! The sequence is calculated in minutes: 1m, 1m, 2m, 3m, 5m, 8m, 10m (max).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const MIN_MINUTES: u64 = 1;
const MAX_MINUTES: u64 = 10;

/// Calculate the Fibonacci backoff duration for a given error count.
///
/// The sequence starts at `MIN_MINUTES` for counts 0 and 1, then follows
/// the Fibonacci sequence capped at `MAX_MINUTES`.
#[must_use]
pub fn for_error_count(error_count: u32) -> Duration {
    if error_count <= 1 {
        return Duration::from_secs(MIN_MINUTES * 60);
    }

    let mut prev_minutes = MIN_MINUTES;
    let mut current_minutes = MIN_MINUTES;
    for _ in 2..=error_count {
        let next_minutes = prev_minutes + current_minutes;
        prev_minutes = current_minutes;
        current_minutes = std::cmp::min(next_minutes, MAX_MINUTES);
        if current_minutes >= MAX_MINUTES {
            break;
        }
    }

    Duration::from_secs(current_minutes * 60)
}

/// Per-object consecutive-error counters feeding [`for_error_count`].
///
/// Bumped by the error policy, reset when a reconcile succeeds.
#[derive(Debug, Default)]
pub struct ErrorCounts {
    counts: Mutex<HashMap<String, u32>>,
}

impl ErrorCounts {
    /// Records one more consecutive error for `key` and returns the total.
    pub fn bump(&self, key: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Clears the counter for `key` after a successful reconcile.
    pub fn reset(&self, key: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibonacci_sequence_in_minutes() {
        // 1m, 1m, 2m, 3m, 5m, 8m, 10m (max)
        assert_eq!(for_error_count(0), Duration::from_secs(60));
        assert_eq!(for_error_count(1), Duration::from_secs(60));
        assert_eq!(for_error_count(2), Duration::from_secs(120));
        assert_eq!(for_error_count(3), Duration::from_secs(180));
        assert_eq!(for_error_count(4), Duration::from_secs(300));
        assert_eq!(for_error_count(5), Duration::from_secs(480));
        assert_eq!(for_error_count(6), Duration::from_secs(600));
    }

    #[test]
    fn caps_at_max() {
        assert_eq!(for_error_count(7), Duration::from_secs(600));
        assert_eq!(for_error_count(100), Duration::from_secs(600));
    }

    #[test]
    fn counters_bump_and_reset() {
        let counts = ErrorCounts::default();
        assert_eq!(counts.bump("scan/nightly"), 1);
        assert_eq!(counts.bump("scan/nightly"), 2);
        assert_eq!(counts.bump("scan/other"), 1);
        counts.reset("scan/nightly");
        assert_eq!(counts.bump("scan/nightly"), 1);
    }
}
