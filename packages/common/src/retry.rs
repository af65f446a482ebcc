use std::time::Duration;

use rand::Rng;

/// Calculate exponential backoff delay with additive jitter.
///
/// Formula: `min(base_ms * 2^attempt, cap_ms) + jitter`, where `attempt`
/// is 0-based and jitter is uniform in `0..=jitter_ms`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, cap_ms: u64, jitter_ms: u64) -> Duration {
    let exp_factor = 2u64.saturating_pow(attempt);
    let delay_ms = base_ms.saturating_mul(exp_factor).min(cap_ms);

    let jitter = if jitter_ms > 0 {
        rand::rng().random_range(0..=jitter_ms)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        // 200ms base, no jitter: 200, 400, 800, 1600.
        for (attempt, expected) in [(0u32, 200u64), (1, 400), (2, 800), (3, 1600)] {
            let d = calculate_backoff(attempt, 200, 2000, 0);
            assert_eq!(d.as_millis() as u64, expected);
        }
    }

    #[test]
    fn respects_cap() {
        let d = calculate_backoff(10, 200, 2000, 0);
        assert_eq!(d.as_millis(), 2000);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let d = calculate_backoff(0, 200, 2000, 200);
            let ms = d.as_millis() as u64;
            assert!((200..=400).contains(&ms), "got {ms}ms");
        }
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let d = calculate_backoff(u32::MAX, u64::MAX, 5000, 0);
        assert_eq!(d.as_millis(), 5000);
    }
}
