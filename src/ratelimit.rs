//! Request quotas for the expensive endpoints.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::warn;

use crate::error::{GuardianError, GuardianResult};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A process-wide per-minute quota shared by every caller of one route.
#[derive(Clone)]
pub struct RouteQuota {
    route: &'static str,
    limiter: Arc<DirectLimiter>,
}

impl RouteQuota {
    /// A zero quota is treated as one request per minute.
    pub fn per_minute(route: &'static str, requests: u32) -> Self {
        let requests = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        Self {
            route,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(requests))),
        }
    }

    pub fn check(&self) -> GuardianResult<()> {
        self.limiter.check().map_err(|_| {
            warn!("Rate limit exceeded for {}", self.route);
            GuardianError::RateLimited
        })
    }
}
