//! Token bucket gate for broker-bound traffic
//!
//! Callers reserve a token and then sleep until the reservation matures.
//! Reservations are handed out in lock order, so waiters are served FIFO
//! and nothing is ever dropped.

use async_trait::async_trait;
use dispatcher_server_domain::{DomainError, RequestContext, Result};
use dispatcher_shared::config::CloudConnectorConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Block until a token is available.
    ///
    /// Fails with `DeadlineExceeded`, without consuming a token, when the
    /// wait would outlast the context deadline.
    async fn wait(&self, ctx: &RequestContext) -> Result<()>;
}

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Tokens added per second
    pub rate_per_second: f64,
    /// Bucket capacity (burst size)
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 100.0,
            burst: 60,
        }
    }
}

impl From<&CloudConnectorConfig> for RateLimitConfig {
    fn from(config: &CloudConnectorConfig) -> Self {
        Self {
            rate_per_second: f64::from(config.rps),
            burst: config.req_bucket,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucketRateLimiter {
    state: Mutex<BucketState>,
    config: RateLimitConfig,
}

impl TokenBucketRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(config.burst),
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Reserve one token and return how long the caller must wait for it
    async fn reserve(&self, limit: Option<Duration>) -> Result<Duration> {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens =
            (state.tokens + elapsed * self.config.rate_per_second).min(f64::from(self.config.burst));
        state.last_refill = now;

        let after = state.tokens - 1.0;
        let wait = if after >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-after / self.config.rate_per_second)
        };

        if let Some(limit) = limit {
            if wait > limit {
                return Err(DomainError::DeadlineExceeded);
            }
        }

        state.tokens = after;
        Ok(wait)
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn wait(&self, ctx: &RequestContext) -> Result<()> {
        let wait = self.reserve(ctx.remaining()).await?;
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

/// Limiter that never blocks
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedRateLimiter;

#[async_trait]
impl RateLimiter for UnlimitedRateLimiter {
    async fn wait(&self, _ctx: &RequestContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod rate_limiter_tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(rate_per_second: f64, burst: u32) -> TokenBucketRateLimiter {
        TokenBucketRateLimiter::new(RateLimitConfig {
            rate_per_second,
            burst,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_served_immediately() {
        let limiter = limiter(1.0, 5);
        let ctx = RequestContext::generated();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.wait(&ctx).await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_blocks_instead_of_dropping() {
        let limiter = limiter(10.0, 1);
        let ctx = RequestContext::generated();
        let start = Instant::now();

        limiter.wait(&ctx).await.unwrap();
        limiter.wait(&ctx).await.unwrap();
        limiter.wait(&ctx).await.unwrap();

        // two refills at 100ms each
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_all_complete() {
        let limiter = Arc::new(limiter(100.0, 2));
        let mut handles = Vec::new();

        for _ in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.wait(&RequestContext::generated()).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_deadline_shorter_than_wait_fails_without_consuming() {
        let limiter = limiter(0.1, 1);
        let unbounded = RequestContext::generated();
        limiter.wait(&unbounded).await.unwrap();

        let hurried = RequestContext::generated().with_timeout(Duration::from_millis(50));
        let err = limiter.wait(&hurried).await.unwrap_err();
        assert!(matches!(err, DomainError::DeadlineExceeded));

        // the failed attempt did not push the next reservation further out
        let state = limiter.state.lock().await;
        assert!(state.tokens > -0.01);
    }
}
