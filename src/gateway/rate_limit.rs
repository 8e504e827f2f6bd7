use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sliding-window call budget: at most `max_calls` admissions in any
/// `window`-long span.
///
/// Uses `tokio::time::Instant` so paused-clock tests can drive it.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_calls: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Admit one call now, or return how long until the window has room.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut admitted = self
            .admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while admitted
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            admitted.pop_front();
        }

        if admitted.len() < self.max_calls {
            admitted.push_back(now);
            return Ok(());
        }

        let oldest = admitted.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Suspend until the window admits a call. Returns `false` if `cancel`
    /// fired first; no budget is consumed in that case.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return true,
                Err(wait) => wait,
            };
            tracing::debug!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Rate limit reached, waiting"
            );
            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Calls admitted within the current window.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}
