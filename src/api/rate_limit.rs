//! Global request rate limiting for `/api/*`.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Token bucket shared by every API request.
pub struct RateLimitService {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RateLimitService {
    pub fn new(config: RateLimitConfig) -> Self {
        if !config.enabled {
            debug!("Rate limiting disabled");
            return Self { limiter: None };
        }

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(rate);
        Self {
            limiter: Some(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))),
        }
    }

    /// Take one token; `false` means the request should be rejected.
    pub fn check(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}
