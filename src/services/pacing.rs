//! Pacing of calls to rate-limited collaborators.
//!
//! Call sites decide *when* a gap is owed (between consecutive upstream calls);
//! a [`Pacer`] decides *how* that gap is enforced.
use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

#[async_trait::async_trait]
pub trait Pacer: Send + Sync {
    /// Waits until the next call may be issued
    async fn pause(&self);

    /// Pacer name for logging
    fn name(&self) -> &'static str;
}

/// Sleeps a fixed interval at every pause
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait::async_trait]
impl Pacer for FixedInterval {
    async fn pause(&self) {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }

    fn name(&self) -> &'static str {
        "fixed_interval"
    }
}

/// Never waits
#[derive(Debug, Clone, Copy, Default)]
pub struct Unpaced;

#[async_trait::async_trait]
impl Pacer for Unpaced {
    async fn pause(&self) {}

    fn name(&self) -> &'static str {
        "unpaced"
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: bursts of up to `capacity` calls, then `rate` calls per second
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate_per_second: f64, capacity: u32) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            rate: rate_per_second.max(f64::MIN_POSITIVE),
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }
}

#[async_trait::async_trait]
impl Pacer for TokenBucket {
    async fn pause(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state, Instant::now());
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Near-zero rates overflow Duration; wait indefinitely instead
                Duration::try_from_secs_f64((1.0 - state.tokens) / self.rate)
                    .unwrap_or(Duration::MAX)
            };
            tokio::time::sleep(wait).await;
        }
    }

    fn name(&self) -> &'static str {
        "token_bucket"
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_sleeps_exactly_interval() {
        let pacer = FixedInterval::new(Duration::from_millis(500));
        let start = Instant::now();
        pacer.pause().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaced_does_not_wait() {
        let start = Instant::now();
        Unpaced.pause().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_allows_burst_then_throttles() {
        let pacer = TokenBucket::new(2.0, 2);
        let start = Instant::now();

        pacer.pause().await;
        pacer.pause().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        pacer.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_zero_rate_waits_without_panicking() {
        let pacer = TokenBucket::new(0.0, 1);
        pacer.pause().await;

        let second = tokio::time::timeout(Duration::from_secs(3600), pacer.pause()).await;
        assert!(second.is_err());
    }
}
