// SPDX-License-Identifier: GPL-3.0-only

use std::cmp::Ordering;

fn component(s: &str) -> u64 {
    s.trim().parse().unwrap_or(0)
}

/// Compare a reported dotted version against `threshold`.
///
/// Components that are not numbers count as 0. Extra trailing components on
/// the reported side make it greater, extra ones on the threshold side make
/// it lower.
pub fn compare_versions(reported: &str, threshold: &str) -> Ordering {
    let reported: Vec<&str> = reported.split('.').collect();
    let threshold: Vec<&str> = threshold.split('.').collect();

    for (i, r) in reported.iter().enumerate() {
        let Some(t) = threshold.get(i) else {
            return Ordering::Greater;
        };

        match component(r).cmp(&component(t)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    if threshold.len() > reported.len() {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

/// True when `reported` predates `threshold` and thus needs the
/// synthesized drive-added events.
pub fn is_affected_version(reported: &str, threshold: &str) -> bool {
    compare_versions(reported, threshold) == Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: &str = "2.1.7.1";

    #[test]
    fn equal_version_is_not_affected() {
        assert_eq!(compare_versions("2.1.7.1", THRESHOLD), Ordering::Equal);
        assert!(!is_affected_version("2.1.7.1", THRESHOLD));
    }

    #[test]
    fn shorter_prefix_is_lower() {
        assert_eq!(compare_versions("2.1.7", THRESHOLD), Ordering::Less);
        assert!(is_affected_version("2.1.7", THRESHOLD));
    }

    #[test]
    fn newer_releases_are_not_affected() {
        assert!(!is_affected_version("2.1.8", THRESHOLD));
        assert!(!is_affected_version("2.10.1", THRESHOLD));
        assert!(!is_affected_version("2.1.7.1.1", THRESHOLD));
    }

    #[test]
    fn older_releases_are_affected() {
        assert!(is_affected_version("2.1.6", THRESHOLD));
        assert!(is_affected_version("2.1.7.0", THRESHOLD));
        assert!(is_affected_version("1.99", THRESHOLD));
    }

    #[test]
    fn garbage_components_count_as_zero() {
        assert!(is_affected_version("", THRESHOLD));
        assert_eq!(compare_versions("2.x", "2.0"), Ordering::Equal);
    }
}
