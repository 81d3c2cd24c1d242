//! Rate limiting middleware using token bucket algorithm

use askdocs_common::config::RateLimitConfig;
use askdocs_common::errors::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Process-wide token bucket
#[derive(Clone)]
pub struct GlobalRateLimit {
    limiter: Arc<DefaultDirectRateLimiter>,
    requests_per_second: u32,
}

impl GlobalRateLimit {
    /// Zero values are raised to one
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            requests_per_second: per_second.get(),
        }
    }

    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl From<&RateLimitConfig> for GlobalRateLimit {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<GlobalRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if limit.check() {
        Ok(next.run(request).await)
    } else {
        Err(AppError::RateLimited {
            limit: limit.requests_per_second,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let limit = GlobalRateLimit::new(1, 2);
        assert!(limit.check());
        assert!(limit.check());
        assert!(!limit.check());
    }

    #[test]
    fn test_zero_config_does_not_panic() {
        let limit = GlobalRateLimit::new(0, 0);
        assert!(limit.check());
    }
}
