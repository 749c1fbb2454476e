//! Token-bucket guard for calls to the upstream icon provider.

use crate::{config::Config, errors::FaviconError};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use tracing::debug;

/// Process-wide limiter for upstream lookups. Lock-free and safe to share
/// across tasks behind an `Arc`.
pub struct UpstreamLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    per_second: NonZeroU32,
    burst: NonZeroU32,
}

impl UpstreamLimiter {
    pub fn new(per_second: u32, burst: u32) -> Result<Self, FaviconError> {
        let per_second = NonZeroU32::new(per_second)
            .ok_or_else(|| FaviconError::Internal("rate limit must be greater than zero".to_string()))?;
        let burst = NonZeroU32::new(burst)
            .ok_or_else(|| FaviconError::Internal("rate limit burst must be greater than zero".to_string()))?;

        let quota = Quota::per_second(per_second).allow_burst(burst);
        Ok(Self {
            limiter: RateLimiter::direct(quota),
            per_second,
            burst,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FaviconError> {
        Self::new(config.rate_limit_per_second, config.rate_limit_burst)
    }

    /// Take one token if available. Never waits.
    pub fn allow(&self) -> bool {
        match self.limiter.check() {
            Ok(()) => true,
            Err(_) => {
                debug!(
                    "Upstream limiter denied request (rate {}/s, burst {})",
                    self.per_second, self.burst
                );
                false
            }
        }
    }
}
