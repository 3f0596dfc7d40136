//! Exponential backoff with full jitter.

use std::time::Duration;

use rand::Rng;

/// Floor below which a jittered delay is raised back to the configured
/// minimum, preventing pathologically tight retry loops.
const MIN_EFFECTIVE_DELAY: Duration = Duration::from_millis(1);

/// Deterministic exponential delay for retry `attempt` (1-based):
/// `min_delay * 2^(attempt - 1)`, capped at `max_delay`.
pub fn exponential_delay(attempt: u32, min_delay: Duration, max_delay: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(32);
    let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
    min_delay
        .checked_mul(factor)
        .map(|d| d.min(max_delay))
        .unwrap_or(max_delay)
}

/// Full jitter: a uniform sample in `[0, delay]`.
pub fn full_jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    Duration::from_nanos(rand::rng().random_range(0..=delay.as_nanos() as u64))
}

/// The jittered backoff delay for retry `attempt`. A sample that lands
/// under 1 ms is raised to `min_delay`.
pub fn backoff_delay(attempt: u32, min_delay: Duration, max_delay: Duration) -> Duration {
    let jittered = full_jitter(exponential_delay(attempt, min_delay, max_delay));
    if jittered < MIN_EFFECTIVE_DELAY {
        min_delay
    } else {
        jittered
    }
}
