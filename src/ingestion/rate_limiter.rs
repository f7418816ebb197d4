//! C6: per-user token bucket gating message processing (§4.6). Buckets are
//! created on first sighting and never evicted, the same lazily-populated,
//! never-swept-map shape the reference service uses for `ALL_USERS_MAP` and
//! `GAME_MAP` — just keyed by `from_id` instead of `user_id`/`game_id`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

const CAPACITY: f64 = 3.0;
const REFILL_PER_SECOND: f64 = 3.0;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new() -> Self {
        Bucket {
            tokens: CAPACITY,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * REFILL_PER_SECOND).min(CAPACITY);
        self.last_refill = now;
    }
}

/// Process-local registry of per-user buckets (§5's "shared resources").
pub struct RateLimiter {
    buckets: Mutex<HashMap<i64, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Arc<Self> {
        Arc::new(RateLimiter {
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// Waits cooperatively until a token is available for `from_id`, then
    /// consumes it. Capacity 3, refill 3/s (§4.6).
    pub async fn acquire(&self, from_id: i64) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let bucket = buckets.entry(from_id).or_insert_with(Bucket::new);
                bucket.refill();
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / REFILL_PER_SECOND))
                }
            };
            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_three_acquires_are_immediate() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(1).await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn fourth_acquire_waits_for_refill() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            limiter.acquire(1).await;
        }
        let start = Instant::now();
        limiter.acquire(1).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn buckets_are_independent_per_user() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            limiter.acquire(1).await;
        }
        let start = Instant::now();
        limiter.acquire(2).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
