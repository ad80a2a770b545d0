//! Backoff delays between attempts.

use std::time::Duration;
use rand::Rng;

/// Exponential backoff with jitter for request retries.
///
/// `attempt` is the number of attempts already made; zero means no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 || base_ms == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Fixed delay between realtime connection attempts.
pub fn fixed_delay(delay_ms: u64) -> Duration {
    Duration::from_millis(delay_ms)
}
