//! Jittered exponential backoff for retryable external interactions
//!
//! Full jitter keeps many concurrently processed instruments from
//! retrying a struggling store or provider in lockstep.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with full jitter and a hard cap
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Sensible defaults for store retries: 100ms base, 5s cap
    pub fn for_store() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5))
    }

    /// Number of delays handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Next delay: uniformly random in [0, min(cap, base * 2^attempt)]
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.cap);
        self.attempt = self.attempt.saturating_add(1);

        let max_ms = exp.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// Sleep for the next jittered delay
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_respect_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(400));
        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_millis(400));
        }
        assert_eq!(backoff.attempts(), 20);
    }

    #[test]
    fn test_envelope_grows_until_cap() {
        // The jittered delay is bounded by base * 2^n; sample repeatedly
        // and confirm nothing escapes the envelope for early attempts.
        for _ in 0..50 {
            let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_secs(10));
            assert!(backoff.next_delay() <= Duration::from_millis(50));
            assert!(backoff.next_delay() <= Duration::from_millis(100));
            assert!(backoff.next_delay() <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::for_store();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
    }
}
