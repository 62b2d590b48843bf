//! Process-wide request admission.
//!
//! A single token bucket shared by every connection: it refills at `rps` tokens per
//! second up to `burst`, and each request spends one token. A request arriving to an
//! empty bucket is refused with 429 before any routing or authentication happens.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use crate::{config::LimiterConfig, error::AppError};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// RateLimiter
pub struct RateLimiter {
    rps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter whose bucket starts full.
    pub fn new(config: &LimiterConfig) -> Self {
        let burst = f64::from(config.burst.max(1));
        Self {
            rps: config.rps.max(0.0),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token if available.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// [`RateLimiter::try_acquire`] against an explicit clock reading.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(self.burst);
        bucket.last_refill = bucket.last_refill.max(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// rate_limit
///
/// Middleware wrapping the whole router when the limiter is enabled.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.try_acquire() {
        tracing::warn!(uri = %request.uri(), "rate limit exceeded");
        return AppError::RateLimitExceeded.into_response();
    }
    next.run(request).await
}
