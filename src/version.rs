//! Dotted version comparison.
//!
//! Release tags are not always valid semver ("1.2", "2024.3.1.7"), so versions
//! are compared as sequences of numeric segments instead.

use std::cmp::Ordering;

/// Returns `true` if `candidate` is strictly newer than `current`.
///
/// Both strings are split on `.` and each segment is parsed as a non-negative
/// integer. Missing trailing segments count as `0`, so `"1.2"` equals
/// `"1.2.0"`. A segment that is not a plain integer (`"1.2.0-beta"` has the
/// segment `"0-beta"`) also counts as `0`; callers that need pre-release
/// ordering must normalise tags before comparing.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Compare two dotted versions segment by segment.
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|segment| segment.trim().parse::<u64>().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_zero_segments_are_equal() {
        assert!(!is_newer("1.2.0", "1.2"));
        assert!(!is_newer("1.2", "1.2.0"));
        assert_eq!(compare("1.2", "1.2.0.0"), Ordering::Equal);
    }

    #[test]
    fn higher_minor_beats_higher_patch() {
        assert!(is_newer("1.3", "1.2.9"));
        assert!(!is_newer("1.2.9", "1.3"));
    }

    #[test]
    fn equal_versions_are_not_newer() {
        assert!(!is_newer("2.0", "2.0"));
        assert!(!is_newer("0.0.1", "0.0.1"));
    }

    #[test]
    fn segments_compare_numerically_not_lexically() {
        assert!(is_newer("1.10.0", "1.9.0"));
        assert!(!is_newer("1.9.0", "1.10.0"));
    }

    #[test]
    fn longer_candidate_with_nonzero_tail_is_newer() {
        assert!(is_newer("1.2.0.1", "1.2"));
    }

    #[test]
    fn non_numeric_segments_count_as_zero() {
        assert!(!is_newer("1.2.x", "1.2.0"));
        assert!(is_newer("1.3.beta", "1.2.9"));
        assert_eq!(compare("1.2.0-rc1", "1.2"), Ordering::Equal);
    }

    #[test]
    fn ordering_is_antisymmetric() {
        let pairs = [("1.0", "1.0.1"), ("3.2.1", "3.10"), ("0.9", "1")];
        for (a, b) in pairs {
            assert!(!(is_newer(a, b) && is_newer(b, a)), "{a} vs {b}");
        }
    }
}
