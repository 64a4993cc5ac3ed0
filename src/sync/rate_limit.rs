use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Attempts made for a single metadata window before it is skipped.
pub const MAX_ATTEMPTS: u32 = 3;
/// Fixed pause between metadata attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
/// How often a throttled request re-checks the window.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

const WINDOW: Duration = Duration::from_secs(1);

/// Sliding one-second window of dispatch times, capped at `qps` entries.
///
/// A slot is claimed under the same lock that checks the window, so
/// concurrent callers can never jointly dispatch more than `qps` requests in
/// any trailing second.
#[derive(Debug)]
pub struct RateLimiter {
    qps: usize,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(qps: usize) -> Self {
        let qps = qps.max(1);
        Self {
            qps,
            window: Mutex::new(VecDeque::with_capacity(qps)),
        }
    }

    pub fn qps(&self) -> usize {
        self.qps
    }

    /// Wait until a dispatch slot is free, then claim it.
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Claim a slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() < self.qps {
            window.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Retry an async expression up to [`MAX_ATTEMPTS`] times, sleeping
/// [`RETRY_DELAY`] between failures.
///
/// Usage: `retry_fixed!("2024-01-01 - 2024-01-31", transport.get(&url, &q, &h))`
///
/// The expression is re-evaluated on each attempt. Evaluates to the last
/// error once attempts run out.
macro_rules! retry_fixed {
    ($label:expr, $expr:expr) => {{
        let mut _attempt: u32 = 0;
        loop {
            _attempt += 1;
            match $expr.await {
                Ok(val) => break Ok(val),
                Err(e) => {
                    if _attempt < $crate::sync::rate_limit::MAX_ATTEMPTS {
                        log::warn!(
                            "{} failed (attempt {}/{}): {e}",
                            $label,
                            _attempt,
                            $crate::sync::rate_limit::MAX_ATTEMPTS
                        );
                        tokio::time::sleep($crate::sync::rate_limit::RETRY_DELAY).await;
                    } else {
                        break Err(e);
                    }
                }
            }
        }
    }};
}

pub(crate) use retry_fixed;
