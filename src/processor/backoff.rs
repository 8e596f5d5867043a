use rand::Rng;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Exponential backoff with jitter for throttled cycles.
///
/// Each call to [`RetryBackoff::next_delay`] returns a delay drawn from the
/// upper half of the current window, then doubles the window up to
/// `max_delay`. [`RetryBackoff::reset`] starts over after a successful cycle.
#[derive(Debug, Clone)]
pub(crate) struct RetryBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    current: Duration,
    attempts: usize,
}

impl RetryBackoff {
    pub(crate) fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        let max_delay = max_delay.max(initial_delay);
        Self {
            initial_delay,
            max_delay,
            current: initial_delay,
            attempts: 0,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let delay = with_jitter(self.current);
        self.current = next_backoff(self.current, self.max_delay);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial_delay;
        self.attempts = 0;
    }

    /// Consecutive throttled attempts since the last reset.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }
}

/// Sleeps for `delay` unless the token fires first. Returns `false` when cancelled.
pub(crate) async fn sleep_with_cancellation(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        yield_now().await;
        return !token.is_cancelled();
    }

    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

fn with_jitter(window: Duration) -> Duration {
    let nanos = window.as_nanos().min(u64::MAX as u128) as u64;
    if nanos < 2 {
        return window;
    }
    let half = nanos / 2;
    Duration::from_nanos(half + rand::thread_rng().gen_range(0..=nanos - half))
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    let mut next = current.saturating_mul(2);
    if next > max_backoff {
        next = max_backoff;
    }
    next
}
