//! Time conversion utilities for mtime encoding.

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Converts a `libc::timespec` to nanoseconds since the Unix epoch.
///
/// A negative `tv_sec` saturates to zero. The original C core instead casts
/// `tv_sec` straight to `uint64_t`, which wraps; real mtimes are never
/// negative, so the two only disagree on inputs neither side needs to
/// handle correctly.
pub(crate) fn timespec_to_nsec(ts: libc::timespec) -> u64 {
    let secs = ts.tv_sec.max(0) as u64;
    secs.saturating_mul(NSEC_PER_SEC) + ts.tv_nsec as u64
}

/// Quantizes `nsec` down to a multiple of `granularity` by integer division.
pub(crate) fn quantize(nsec: u64, granularity: u64) -> u64 {
    (nsec / granularity) * granularity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantizes_to_whole_seconds() {
        assert_eq!(
            quantize(1_234_567_890_123_456_789, 1_000_000_000),
            1_234_567_890_000_000_000
        );
    }

    #[test]
    fn quantize_by_one_is_identity() {
        assert_eq!(quantize(123_456_789, 1), 123_456_789);
    }

    #[test]
    fn quantize_by_two_sec() {
        assert_eq!(quantize(2_999_999_999, 2_000_000_000), 2_000_000_000);
    }

    #[test]
    fn timespec_conversion_matches_manual_math() {
        let ts = libc::timespec {
            tv_sec: 10,
            tv_nsec: 500,
        };
        assert_eq!(timespec_to_nsec(ts), 10 * NSEC_PER_SEC + 500);
    }

    #[test]
    fn negative_seconds_saturate_to_zero() {
        let ts = libc::timespec {
            tv_sec: -5,
            tv_nsec: 100,
        };
        assert_eq!(timespec_to_nsec(ts), 100);
    }
}
