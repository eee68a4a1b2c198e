use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::tables::SOURCE_PAGE_REQUESTS_PER_MINUTE;

/// Caps the number of calls per window. Once the cap is hit the next caller
/// sleeps until the window has run out, then a fresh window starts.
///
/// Callers are served one at a time.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<Window>,
}

struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Wait, if needed, until another call fits in the window and count it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let elapsed = state.started.elapsed();
        if elapsed >= self.window {
            state.started = Instant::now();
            state.count = 0;
        } else if state.count >= self.limit {
            let wait = self.window - elapsed;
            debug!(wait_secs = wait.as_secs_f64(), "Hit rate limit, waiting");
            sleep(wait).await;
            state.started = Instant::now();
            state.count = 0;
        }
        state.count += 1;
    }

    /// Run `call` once it fits in the window.
    pub async fn limited<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        call().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(SOURCE_PAGE_REQUESTS_PER_MINUTE)
    }
}
