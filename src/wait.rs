use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timeout-bounded polling. Every wait in the pipeline goes through here.
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Waiter {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self { timeout, ..*self }
    }

    /// Polls `probe` until it yields a value or the timeout elapses.
    /// The probe always runs at least once.
    pub async fn until<T, F, Fut>(&self, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(value) = probe().await {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            sleep(self.interval.min(deadline - now)).await;
        }
    }

    pub async fn pause(&self, duration: Duration) {
        sleep(duration).await;
    }
}

/// Delay before retry `attempt` (1-based): base, 2*base, 4*base, ...
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}
