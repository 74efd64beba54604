//! Per-URL circuit breaker.
//!
//! One small state tuple per webhook URL, shared across every delivery in
//! the process and guarded by a single reader/writer lock. The lock is
//! held only to read or update the tuple, never across I/O.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Failure-accounting state for one webhook URL.
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    /// Failures since the last successful delivery.
    pub consecutive_failures: u32,
    /// While set and in the future, deliveries to the URL are refused.
    pub open_until: Option<DateTime<Utc>>,
    /// When the URL last failed.
    pub last_failed_at: Option<DateTime<Utc>>,
}

/// The process-wide circuit breaker, keyed by webhook URL.
#[derive(Debug)]
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    threshold: u32,
    open_for: chrono::Duration,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures
    /// and stays open for `open_for`.
    #[must_use]
    pub fn new(threshold: u32, open_for: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            threshold,
            open_for: chrono::Duration::from_std(open_for)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        }
    }

    /// Record a failed delivery and return the updated state.
    pub fn record_failure(&self, url: &str) -> CircuitState {
        let mut states = self.states.write();
        let state = states.entry(url.to_string()).or_default();

        let now = Utc::now();
        state.consecutive_failures += 1;
        state.last_failed_at = Some(now);
        if state.consecutive_failures >= self.threshold {
            state.open_until = Some(now + self.open_for);
        }

        state.clone()
    }

    /// Record a successful delivery: the failure count resets and any open
    /// circuit closes.
    pub fn record_success(&self, url: &str) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(url) {
            state.consecutive_failures = 0;
            state.open_until = None;
        }
    }

    /// Whether the URL's circuit is currently open.
    #[must_use]
    pub fn is_open(&self, url: &str) -> bool {
        self.states
            .read()
            .get(url)
            .and_then(|state| state.open_until)
            .is_some_and(|until| until > Utc::now())
    }

    /// The current state for a URL, if any failures were recorded.
    #[must_use]
    pub fn state(&self, url: &str) -> Option<CircuitState> {
        self.states.read().get(url).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://c.test/h";

    #[test]
    fn failures_accumulate_until_threshold_opens() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure(URL);
        breaker.record_failure(URL);
        assert!(!breaker.is_open(URL));

        let state = breaker.record_failure(URL);
        assert_eq!(state.consecutive_failures, 3);
        assert!(state.open_until.is_some());
        assert!(breaker.is_open(URL));
    }

    #[test]
    fn success_resets_count_and_closes_circuit() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure(URL);
        breaker.record_failure(URL);
        assert!(breaker.is_open(URL));

        breaker.record_success(URL);
        assert!(!breaker.is_open(URL));
        assert_eq!(breaker.state(URL).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn circuit_expires_after_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(30));
        breaker.record_failure(URL);
        assert!(breaker.is_open(URL));

        std::thread::sleep(Duration::from_millis(50));
        assert!(!breaker.is_open(URL));
    }

    #[test]
    fn urls_are_independent() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure(URL);
        assert!(breaker.is_open(URL));
        assert!(!breaker.is_open("https://other.test/h"));
    }

    #[test]
    fn success_on_unknown_url_is_a_noop() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_success(URL);
        assert!(breaker.state(URL).is_none());
    }
}
