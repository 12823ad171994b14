//! Reconnect backoff and log throttling for the real-time client.

use std::time::{Duration, Instant};

/// Base delay before the first reconnect attempt.
pub const BASE_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for a single reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Window within which transient transport failures are logged at most once.
pub const TRANSIENT_LOG_WINDOW: Duration = Duration::from_secs(5);

/// Calculate the reconnect delay for the given attempt (0-based).
///
/// Exponential: `500ms * 2^attempt`, capped at [`MAX_RECONNECT_DELAY`].
pub fn reconnect_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    BASE_RECONNECT_DELAY
        .saturating_mul(factor)
        .min(MAX_RECONNECT_DELAY)
}

/// Spread a delay by up to ±20% so that many clients dropped by the same
/// outage do not reconnect in lockstep.
pub fn with_jitter(delay: Duration, rng: &mut impl rand::Rng) -> Duration {
    let factor: f64 = rng.random_range(0.8..=1.2);
    delay.mul_f64(factor)
}

/// Allows one log line per window.
///
/// The first call always passes; later calls pass only once `window` has
/// elapsed since the last accepted call. Suppressed calls are counted so the
/// next accepted line can report them.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    window: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            suppressed: 0,
        }
    }

    /// Returns `Some(suppressed_since_last)` if a line may be logged at `now`.
    pub fn allow(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(TRANSIENT_LOG_WINDOW)
    }
}
