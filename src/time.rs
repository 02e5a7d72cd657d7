//! Wraparound-safe millisecond time arithmetic.
//!
//! The monotonic clock is a `u32` millisecond counter that wraps roughly
//! every 49.7 days. Every duration computed from two timestamps must go
//! through [`elapsed`] rather than plain subtraction, or a wrap will read as
//! a huge duration instead of a small one.

/// Milliseconds elapsed from `since` to `now`, correct across one wraparound
/// of the `u32` clock.
pub fn elapsed(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// `true` iff at least `duration_ms` have elapsed from `since` to `now`.
pub fn has_elapsed(now: u32, since: u32, duration_ms: u32) -> bool {
    elapsed(now, since) >= duration_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_handles_wraparound() {
        let since = u32::MAX - 10;
        let now = 5u32;
        assert_eq!(elapsed(now, since), 16);
    }

    #[test]
    fn elapsed_is_zero_for_equal_timestamps() {
        assert_eq!(elapsed(42, 42), 0);
    }
}
