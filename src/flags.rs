//! Feature-flag normalization (§4.1).

use arcwalk_format::{FeatureFlags, GRANULARITY_2SEC, GRANULARITY_NSEC, GRANULARITY_SEC, GRANULARITY_USEC};

use crate::error::{Error, InputKind};

/// A [`FeatureFlags`] mask together with its derived mtime quantization
/// granularity, canonicalized per §4.1.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NormalizedFlags {
    pub(crate) flags: FeatureFlags,
    pub(crate) time_granularity: u64,
}

/// Validates `requested` against the maximum mask, then applies the
/// precedence rules in §4.1: wider uid/gid width wins, highest-resolution
/// time flag wins, and `WITH_PERMISSIONS` beats `WITH_READONLY`.
pub(crate) fn normalize(requested: FeatureFlags) -> Result<NormalizedFlags, Error> {
    if !FeatureFlags::FEATURE_FLAGS_MAX.contains(requested) {
        return Err(InputKind::UnknownFlag.into());
    }

    let mut flags = requested;

    if flags.contains(FeatureFlags::WITH_UID_GID_32BIT) {
        flags.remove(FeatureFlags::WITH_UID_GID_16BIT);
    }

    let time_granularity = if flags.contains(FeatureFlags::WITH_TIMES_NSEC) {
        flags.remove(
            FeatureFlags::WITH_TIMES_USEC | FeatureFlags::WITH_TIMES_SEC | FeatureFlags::WITH_TIMES_2SEC,
        );
        GRANULARITY_NSEC
    } else if flags.contains(FeatureFlags::WITH_TIMES_USEC) {
        flags.remove(FeatureFlags::WITH_TIMES_SEC | FeatureFlags::WITH_TIMES_2SEC);
        GRANULARITY_USEC
    } else if flags.contains(FeatureFlags::WITH_TIMES_SEC) {
        flags.remove(FeatureFlags::WITH_TIMES_2SEC);
        GRANULARITY_SEC
    } else if flags.contains(FeatureFlags::WITH_TIMES_2SEC) {
        GRANULARITY_2SEC
    } else {
        GRANULARITY_NSEC
    };

    if flags.contains(FeatureFlags::WITH_PERMISSIONS) {
        flags.remove(FeatureFlags::WITH_READONLY);
    }

    Ok(NormalizedFlags {
        flags,
        time_granularity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_bits() {
        let bogus = FeatureFlags::from_bits_retain(1 << 40);
        assert!(matches!(
            normalize(bogus),
            Err(Error::InputKind(InputKind::UnknownFlag))
        ));
    }

    #[test]
    fn wide_uid_gid_wins() {
        let n = normalize(FeatureFlags::WITH_UID_GID_16BIT | FeatureFlags::WITH_UID_GID_32BIT).unwrap();
        assert!(n.flags.contains(FeatureFlags::WITH_UID_GID_32BIT));
        assert!(!n.flags.contains(FeatureFlags::WITH_UID_GID_16BIT));
    }

    #[test]
    fn nsec_beats_every_other_time_flag() {
        let n = normalize(
            FeatureFlags::WITH_TIMES_NSEC
                | FeatureFlags::WITH_TIMES_USEC
                | FeatureFlags::WITH_TIMES_SEC
                | FeatureFlags::WITH_TIMES_2SEC,
        )
        .unwrap();
        assert_eq!(n.time_granularity, GRANULARITY_NSEC);
        assert_eq!(n.flags, FeatureFlags::WITH_TIMES_NSEC);
    }

    #[test]
    fn sec_beats_2sec() {
        let n = normalize(FeatureFlags::WITH_TIMES_SEC | FeatureFlags::WITH_TIMES_2SEC).unwrap();
        assert_eq!(n.time_granularity, GRANULARITY_SEC);
        assert!(!n.flags.contains(FeatureFlags::WITH_TIMES_2SEC));
    }

    #[test]
    fn no_time_flag_defaults_to_nsec_granularity() {
        let n = normalize(FeatureFlags::empty()).unwrap();
        assert_eq!(n.time_granularity, GRANULARITY_NSEC);
    }

    #[test]
    fn permissions_beats_readonly() {
        let n = normalize(FeatureFlags::WITH_PERMISSIONS | FeatureFlags::WITH_READONLY).unwrap();
        assert!(n.flags.contains(FeatureFlags::WITH_PERMISSIONS));
        assert!(!n.flags.contains(FeatureFlags::WITH_READONLY));
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize(FeatureFlags::WITH_BEST).unwrap();
        let twice = normalize(once.flags).unwrap();
        assert_eq!(once.flags, twice.flags);
        assert_eq!(once.time_granularity, twice.time_granularity);
    }
}
