//! Rolling-window send limiter.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Grant timestamps within the window.
#[derive(Debug)]
struct SlidingWindow {
    /// Times of the grants still inside the window.
    grants: VecDeque<Instant>,
    /// Window duration.
    window: Duration,
    /// Maximum grants allowed in the window.
    limit: u32,
}

impl SlidingWindow {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            grants: VecDeque::with_capacity(limit as usize),
            window,
            limit,
        }
    }

    /// Drop grants older than the window.
    fn prune(&mut self, now: Instant) {
        while self
            .grants
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            self.grants.pop_front();
        }
    }

    /// Take a slot, or report how long until the oldest grant expires.
    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);

        if (self.grants.len() as u32) < self.limit {
            self.grants.push_back(now);
            return Ok(());
        }

        let wait = self
            .grants
            .front()
            .map_or(self.window, |oldest| {
                (*oldest + self.window).saturating_duration_since(now)
            });
        Err(wait)
    }

    fn available(&mut self, now: Instant) -> u32 {
        self.prune(now);
        self.limit.saturating_sub(self.grants.len() as u32)
    }
}

/// Allows at most `limit` acquisitions in any rolling `window`.
///
/// [`Limiter::acquire`] waits for a free slot instead of failing.
#[derive(Debug)]
pub struct Limiter {
    window: Mutex<SlidingWindow>,
}

impl Limiter {
    /// Create a limiter. A zero limit is treated as one.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            window: Mutex::new(SlidingWindow::new(limit.max(1), window)),
        }
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) {
        loop {
            // Keep the guard out of the await below.
            let attempt = self.window.lock().try_acquire(Instant::now());
            match attempt {
                Ok(()) => return,
                Err(wait) => {
                    trace!(wait_ms = wait.as_millis() as u64, "send limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Slots that could be taken right now without waiting.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.window.lock().available(Instant::now())
    }
}
