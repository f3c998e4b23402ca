//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use researchease_common::errors::{AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Service-wide limiter in front of the upload routes
pub struct UploadRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
    per_second: u32,
}

impl UploadRateLimiter {
    pub fn new(requests_per_second: u32, burst: u32) -> Result<Arc<Self>> {
        let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
            message: "rate_limit.requests_per_second must be greater than zero".to_string(),
        })?;
        let burst = NonZeroU32::new(burst).ok_or_else(|| AppError::Configuration {
            message: "rate_limit.burst must be greater than zero".to_string(),
        })?;

        Ok(Arc::new(Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            per_second: requests_per_second,
        }))
    }

    pub fn check(&self) -> Result<()> {
        self.limiter.check().map_err(|_| AppError::RateLimited {
            limit: self.per_second,
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<UploadRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Err(e) = limiter.check() {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }
    Ok(next.run(request).await)
}
