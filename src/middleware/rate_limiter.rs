//! Rate limiting middleware
//!
//! Token-bucket limiter with the bucket store and the clock behind
//! injectable seams, so single-instance deployments use the in-memory
//! store while tests drive time themselves. Counters are best-effort
//! abuse protection, not a correctness guarantee: they are lost on
//! restart.

use async_trait::async_trait;
use axum::{body::Body, extract::Request, middleware::Next, response::{IntoResponse, Response}};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Clock seam so tests can pin time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Token bucket for a single client key
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(max_tokens: f64, now: Instant) -> Self {
        Self {
            tokens: max_tokens,
            last_update: now,
        }
    }

    fn try_consume(&mut self, tokens_per_second: f64, max_tokens: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * tokens_per_second).min(max_tokens);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Counter store seam. Single-instance deployments use the in-memory map;
/// a shared external store can be dropped in for multi-instance setups.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Try to take one token for `key`; returns whether the request may
    /// proceed
    async fn try_consume(
        &self,
        key: &str,
        tokens_per_second: f64,
        max_tokens: f64,
        now: Instant,
    ) -> bool;

    /// Evict buckets idle for longer than `max_age`
    async fn cleanup(&self, max_age: Duration, now: Instant);
}

/// Process-local bucket table
#[derive(Clone, Default)]
pub struct InMemoryRateLimitStore {
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn try_consume(
        &self,
        key: &str,
        tokens_per_second: f64,
        max_tokens: f64,
        now: Instant,
    ) -> bool {
        let mut buckets = self.buckets.write().await;

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(max_tokens, now));

        bucket.try_consume(tokens_per_second, max_tokens, now)
    }

    async fn cleanup(&self, max_age: Duration, now: Instant) {
        let mut buckets = self.buckets.write().await;

        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < max_age);
    }
}

/// Rate limiter over an injected store and clock
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    tokens_per_second: f64,
    max_tokens: f64,
}

impl RateLimiter {
    /// Create a limiter with the in-memory store and the system clock
    pub fn new(requests_per_second: u32) -> Self {
        Self::with_store(
            requests_per_second,
            Arc::new(InMemoryRateLimitStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_store(
        requests_per_second: u32,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            tokens_per_second: requests_per_second as f64,
            // Allow burst of 2x
            max_tokens: (requests_per_second * 2) as f64,
        }
    }

    /// Check if a request is allowed
    pub async fn check(&self, key: &str) -> bool {
        self.store
            .try_consume(
                key,
                self.tokens_per_second,
                self.max_tokens,
                self.clock.now(),
            )
            .await
    }

    /// Caller-facing retry hint in seconds
    pub fn retry_after_seconds(&self) -> u64 {
        (1.0 / self.tokens_per_second).ceil().max(1.0) as u64
    }

    /// Cleanup old entries (call periodically)
    pub async fn cleanup(&self, max_age: Duration) {
        self.store.cleanup(max_age, self.clock.now()).await;
    }
}

/// Create rate limiting middleware layer
pub fn rate_limit_layer(
    rate_limiter: RateLimiter,
) -> impl Fn(
    Request<Body>,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send {
    move |request: Request<Body>, next: Next| {
        let rate_limiter = rate_limiter.clone();
        Box::pin(async move {
            let client_key = extract_client_ip(&request);

            if !rate_limiter.check(&client_key).await {
                tracing::warn!(client = %client_key, "Rate limit exceeded");
                return ApiError::TooManyRequests {
                    retry_after: rate_limiter.retry_after_seconds(),
                }
                .into_response();
            }

            next.run(request).await
        })
    }
}

/// Extract client IP from request headers
fn extract_client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(ip) = s.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(s) = real_ip.to_str() {
            return s.to_string();
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Test clock advanced by hand
    struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    #[tokio::test]
    async fn test_burst_then_deny() {
        let limiter = RateLimiter::new(5); // 5 rps, burst 10

        for _ in 0..10 {
            assert!(limiter.check("test-client").await);
        }

        // Bucket is empty now
        assert!(!limiter.check("test-client").await);
    }

    #[tokio::test]
    async fn test_different_clients_have_separate_buckets() {
        let limiter = RateLimiter::new(2);

        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-b").await);
        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-b").await);
    }

    #[tokio::test]
    async fn test_refill_with_manual_clock() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_store(
            1, // 1 rps, burst 2
            Arc::new(InMemoryRateLimitStore::new()),
            clock.clone(),
        );

        assert!(limiter.check("client").await);
        assert!(limiter.check("client").await);
        assert!(!limiter.check("client").await);

        // One second refills one token
        clock.advance(Duration::from_secs(1));
        assert!(limiter.check("client").await);
        assert!(!limiter.check("client").await);
    }

    #[tokio::test]
    async fn test_cleanup_evicts_idle_buckets() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::with_store(1, store.clone(), clock.clone());

        assert!(limiter.check("stale-client").await);

        clock.advance(Duration::from_secs(600));
        limiter.cleanup(Duration::from_secs(300)).await;

        // Evicted bucket comes back fresh with a full burst
        assert!(limiter.check("stale-client").await);
        assert!(limiter.check("stale-client").await);
    }

    #[test]
    fn test_retry_after_hint() {
        assert_eq!(RateLimiter::new(100).retry_after_seconds(), 1);
        assert_eq!(RateLimiter::new(1).retry_after_seconds(), 1);
    }
}
