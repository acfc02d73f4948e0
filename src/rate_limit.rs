//! Fixed inter-request delay, keyed by origin.
//!
//! Each key owns a "next allowed" instant. [`RateLimiter::acquire`] reserves the
//! earliest free slot for its key under a short lock, then sleeps outside the
//! lock until that slot arrives. Callers on different keys never wait on each
//! other; callers on the same key are spaced at least `interval` apart in
//! reservation order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a request for `key` may be issued.
    ///
    /// The first call for a key returns immediately.
    pub async fn acquire(&self, key: &str) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut slots = self
                .next_slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = slots.get(key).map_or(now, |next| (*next).max(now));
            slots.insert(key.to_string(), slot + self.interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            tracing::debug!(
                key = key,
                wait_ms = (slot - now).as_millis() as u64,
                "Pacing request"
            );
            tokio::time::sleep_until(slot).await;
        }
    }
}
