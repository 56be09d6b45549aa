//! Token-bucket rate limiter shared by all workers

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::task::TaskError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with refill rate and burst capacity both equal to
/// `per_second`. The bucket starts full.
pub struct RateLimiter {
    per_second: u32,
    state: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter; `per_second` must be non-zero
    pub fn new(per_second: u32) -> Self {
        debug!(per_second, "RateLimiter::new: called");
        Self {
            per_second,
            state: Mutex::new(Bucket {
                tokens: per_second as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_second(&self) -> u32 {
        self.per_second
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let burst = self.per_second as f64;
        bucket.tokens = (bucket.tokens + elapsed * burst).min(burst);
        bucket.last_refill = now;
    }

    /// Take one token, waiting until one is available
    ///
    /// Returns [`TaskError::Cancelled`] without taking a token if the token
    /// is already cancelled or fires while waiting.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), TaskError> {
        loop {
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }

            let wait = {
                let mut bucket = self.state.lock().await;
                self.refill(&mut bucket, Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.per_second as f64)
            };

            debug!(?wait, "RateLimiter::acquire: bucket empty, waiting");
            tokio::select! {
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Take one token if available, without waiting
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.state.lock().await;
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket
    pub async fn available(&self) -> f64 {
        let mut bucket = self.state.lock().await;
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }
}
