use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Vendor rate limits are expressed per minute.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

struct WindowState {
    count: u32,
    window_start: Instant,
}

/// Fixed-window request gate for one connector.
///
/// The lock is held while waiting for the window to reset, so concurrent
/// callers on the same connector queue behind the sleeper.
pub struct RateLimiter {
    /// Maximum requests per window
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, RATE_WINDOW)
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            state: Mutex::new(WindowState {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Waits until a request may be sent and counts it against the window.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let elapsed = state.window_start.elapsed();
        if elapsed >= self.window {
            state.count = 0;
            state.window_start = Instant::now();
        }

        if state.count >= self.limit {
            let wait = self.window.saturating_sub(state.window_start.elapsed());
            tracing::debug!(
                limit = self.limit,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for window reset"
            );
            sleep(wait).await;
            state.count = 0;
            state.window_start = Instant::now();
        }

        state.count += 1;
    }
}
