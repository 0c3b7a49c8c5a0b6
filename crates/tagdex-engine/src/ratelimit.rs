//! Global upstream rate limiter.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use tagdex_config::UpstreamSettings;
use tokio::{
    sync::Mutex,
    time::{Instant, sleep_until},
};

/// Grants one request per interval, delaying further for every caller already queued.
///
/// Callers are served in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum gap between grants.
    interval: Duration,
    /// Extra delay per queued caller.
    queue_backoff: Duration,
    /// Cap on the extra delay.
    max_queue_backoff: Duration,
    /// Callers currently waiting.
    waiting: AtomicUsize,
    /// Time of the last grant.
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter.
    pub fn new(interval: Duration, queue_backoff: Duration, max_queue_backoff: Duration) -> Self {
        Self {
            interval,
            queue_backoff,
            max_queue_backoff,
            waiting: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    /// Creates a limiter from upstream settings.
    pub fn from_settings(settings: &UpstreamSettings) -> Self {
        Self::new(
            settings.request_interval(),
            settings.queue_backoff(),
            settings.max_queue_backoff(),
        )
    }

    /// Number of callers waiting for a grant.
    pub fn queue_depth(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Waits until a request may be sent.
    ///
    /// A caller that gives up (the future is dropped) leaves the queue.
    pub async fn acquire(&self) {
        let ahead = self.waiting.fetch_add(1, Ordering::SeqCst);
        let _queued = Queued(&self.waiting);
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            sleep_until(previous + self.interval + self.backoff(ahead)).await;
        }
        *last = Some(Instant::now());
    }

    /// Extra delay for a caller with `ahead` callers queued before it.
    fn backoff(&self, ahead: usize) -> Duration {
        let factor = u32::try_from(ahead).unwrap_or(u32::MAX);
        self.queue_backoff
            .saturating_mul(factor)
            .min(self.max_queue_backoff)
    }
}

/// A place in the queue, given up when dropped.
struct Queued<'a>(&'a AtomicUsize);

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
