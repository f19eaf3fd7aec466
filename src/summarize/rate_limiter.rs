// Client-side request pacing for hosted inference endpoints.
//
// Free inference tiers throttle hard. Each caller reserves the next free slot
// under the lock, then sleeps outside it, so concurrent callers queue up at
// `interval` spacing instead of racing for the same slot.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Clone)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Allow at most `requests_per_second` calls per second. Non-positive or
    /// non-finite rates are clamped to one call per second.
    pub fn new(requests_per_second: f64) -> Self {
        let qps = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        Self {
            interval: Duration::from_secs_f64(1.0 / qps),
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for this caller's slot.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_second_request_waits_one_interval() {
        let limiter = RateLimiter::new(4.0);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(200),
            "Expected ~250ms delay, got {:?}",
            elapsed
        );
    }

    #[test]
    fn test_invalid_rate_falls_back_to_one_per_second() {
        assert_eq!(RateLimiter::new(0.0).interval(), Duration::from_secs(1));
        assert_eq!(RateLimiter::new(f64::NAN).interval(), Duration::from_secs(1));
    }
}
