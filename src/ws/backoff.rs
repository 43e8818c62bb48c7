//! Reconnection pacing.
//!
//! The wait after the `n`th consecutive failed dial is
//! `min(max, base * 2^(n-1))`, never less than one second. The sequence is
//! jitter-free so the whole reconnection schedule is reproducible.

use std::time::Duration;

/// Floor for every wait, including ones above a sub-second `max`.
pub const MIN_DELAY: Duration = Duration::from_secs(1);

/// Wait to apply after `retries` consecutive failed dials.
///
/// `retries` counts from one; zero is treated as half of `base`. The
/// multiplication saturates at `max`.
#[must_use]
pub fn delay(retries: u32, base: Duration, max: Duration) -> Duration {
    let computed = match retries {
        0 => base / 2,
        n => 1_u32
            .checked_shl(n - 1)
            .and_then(|factor| base.checked_mul(factor))
            .unwrap_or(max),
    };

    computed.min(max).max(MIN_DELAY)
}
