//! Cutoff (watermark) algebra
//!
//! A cutoff is the exclusive lower bound used to decide which releases
//! are new on the next poll. Advancing the cutoff to the maximum emitted
//! timestamp and filtering strictly-greater on the next call yields
//! at-most-once emission per `(name, version, created_date)` triple,
//! while publisher retries keep the stream at-least-once overall.

use chrono::{DateTime, Utc};

use crate::package::Package;

/// Keeps only packages strictly newer than `cutoff`.
///
/// Strict: a package whose `created_date` equals the cutoff was already
/// emitted on the poll that advanced the watermark to it.
pub fn apply_cutoff(pkgs: Vec<Package>, cutoff: DateTime<Utc>) -> Vec<Package> {
    pkgs.into_iter()
        .filter(|pkg| pkg.created_date > cutoff)
        .collect()
}

/// Returns the maximum of `cutoff` and every package's `created_date`.
pub fn find_cutoff(cutoff: DateTime<Utc>, pkgs: &[Package]) -> DateTime<Utc> {
    pkgs.iter()
        .fold(cutoff, |cutoff, pkg| cutoff.max(pkg.created_date))
}

/// Stable sort by `created_date`, most recent first.
///
/// Drivers fan requests out concurrently, so arrival order is not
/// deterministic; the wire contract and the overlap detector both rely
/// on descending order.
pub fn sort_packages_desc(pkgs: &mut [Package]) {
    pkgs.sort_by(|a, b| b.created_date.cmp(&a.created_date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pkg(name: &str, secs: i64, millis: u32) -> Package {
        let created = Utc.timestamp_opt(secs, millis * 1_000_000).unwrap();
        Package::new(created, name, "1.0.0", "test")
    }

    #[test]
    fn apply_cutoff_is_strict() {
        let cutoff = Utc.timestamp_opt(100, 0).unwrap();
        let pkgs = vec![pkg("old", 50, 0), pkg("boundary", 100, 0), pkg("new", 150, 0)];

        let kept = apply_cutoff(pkgs, cutoff);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "new");
    }

    #[test]
    fn apply_cutoff_respects_millisecond_boundary() {
        // A release one millisecond past the watermark must survive; one
        // exactly on it must not.
        let cutoff = Utc.timestamp_opt(100, 500_000_000).unwrap();
        let pkgs = vec![pkg("exact", 100, 500), pkg("after", 100, 501)];

        let kept = apply_cutoff(pkgs, cutoff);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "after");
    }

    #[test]
    fn find_cutoff_returns_max_created_date() {
        let cutoff = Utc.timestamp_opt(100, 0).unwrap();
        let pkgs = vec![pkg("a", 300, 0), pkg("b", 200, 0)];
        assert_eq!(find_cutoff(cutoff, &pkgs), Utc.timestamp_opt(300, 0).unwrap());
    }

    #[test]
    fn find_cutoff_never_decreases() {
        let cutoff = Utc.timestamp_opt(1_000, 0).unwrap();
        let pkgs = vec![pkg("stale", 500, 0)];
        assert_eq!(find_cutoff(cutoff, &pkgs), cutoff);
    }

    #[test]
    fn find_cutoff_of_empty_slice_is_identity() {
        let cutoff = Utc.timestamp_opt(1_000, 0).unwrap();
        assert_eq!(find_cutoff(cutoff, &[]), cutoff);
    }

    #[test]
    fn filter_then_advance_emits_each_release_once() {
        // Two consecutive polls over overlapping windows: the second poll
        // re-reports B but only C is new.
        let mut cutoff = Utc.timestamp_opt(0, 0).unwrap();

        let first = vec![pkg("a", 3_600, 0), pkg("b", 3_900, 0)];
        let emitted = apply_cutoff(first.clone(), cutoff);
        assert_eq!(emitted.len(), 2);
        cutoff = find_cutoff(cutoff, &first);

        let second = vec![pkg("b", 3_900, 0), pkg("c", 4_200, 0)];
        let emitted = apply_cutoff(second.clone(), cutoff);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].name, "c");
        cutoff = find_cutoff(cutoff, &second);
        assert_eq!(cutoff, Utc.timestamp_opt(4_200, 0).unwrap());
    }

    #[test]
    fn sort_is_most_recent_first_and_stable() {
        let mut pkgs = vec![pkg("a", 100, 0), pkg("b", 300, 0), pkg("c", 100, 0)];
        sort_packages_desc(&mut pkgs);
        assert_eq!(pkgs[0].name, "b");
        // Equal timestamps keep their input order.
        assert_eq!(pkgs[1].name, "a");
        assert_eq!(pkgs[2].name, "c");
    }
}
