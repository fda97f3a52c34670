//! Per-process gateway pacing
//!
//! A single token bucket paces every gateway call made by this process.
//! Tokens refill continuously at the configured rate and cap at the burst
//! capacity, so over any window of length `T` seconds at most
//! `burst + rate * T` acquisitions succeed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with a blocking `acquire`
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(refill_rate: f64, capacity: f64) -> Arc<Self> {
        let capacity = capacity.max(1.0);
        Arc::new(Self {
            capacity,
            refill_rate: refill_rate.max(f64::MIN_POSITIVE),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Take one token without waiting
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take one token, sleeping exactly until enough tokens accrue.
    ///
    /// The lock is dropped before sleeping so concurrent acquirers queue on
    /// the mutex and are served approximately in arrival order; there is no
    /// busy-wait.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_rate)
            };

            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_drains_immediately() {
        let bucket = TokenBucket::new(5.0, 10.0);

        for _ in 0..10 {
            assert!(bucket.try_acquire().await);
        }
        assert!(!bucket.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_refill_over_time() {
        let bucket = TokenBucket::new(5.0, 10.0);

        while bucket.try_acquire().await {}

        // 5 tokens/s: after 1 simulated second, 5 acquisitions succeed
        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..5 {
            assert!(bucket.try_acquire().await);
        }
        assert!(!bucket.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_is_bounded_by_burst() {
        let bucket = TokenBucket::new(5.0, 10.0);

        // A long idle period never accrues more than the burst capacity
        tokio::time::advance(Duration::from_secs(3600)).await;
        for _ in 0..10 {
            assert!(bucket.try_acquire().await);
        }
        assert!(!bucket.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_until_refill() {
        let bucket = TokenBucket::new(10.0, 1.0);
        bucket.acquire().await;

        // Bucket is empty; the next acquire sleeps ~100ms of virtual time
        let before = Instant::now();
        bucket.acquire().await;
        let waited = before.elapsed();

        assert!(waited >= Duration::from_millis(90), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(500), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_bound_over_window() {
        let bucket = TokenBucket::new(5.0, 10.0);
        let mut granted = 0u32;

        // Drain continuously for 4 simulated seconds
        let deadline = Instant::now() + Duration::from_secs(4);
        while Instant::now() < deadline {
            if bucket.try_acquire().await {
                granted += 1;
            } else {
                tokio::time::advance(Duration::from_millis(50)).await;
            }
        }

        // Never more than burst + rate * T
        assert!(granted <= 10 + 5 * 4, "granted {}", granted);
    }
}
