//! Pacing of detail-fetch starts

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::time::Duration;
use tracing::debug;

/// One request start per interval, shared by every worker of a batch
///
/// A zero interval disables pacing.
pub struct RequestPacer {
    limiter: Option<DefaultDirectRateLimiter>,
    interval: Duration,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            limiter: Quota::with_period(interval).map(|quota| RateLimiter::direct(quota)),
            interval,
        }
    }

    /// Resolve once the next request may start
    pub async fn until_ready(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check().is_err() {
            debug!(interval_ms = self.interval.as_millis() as u64, "Pacing detail fetch");
            limiter.until_ready().await;
        }
    }
}
