//! Segment file naming and directory scan.
//!
//! A segment is named `<seq:016x>-<firstindex:016x>.wal`: the sequence
//! number orders segments within a directory and the first-index half is
//! the lowest entry index the segment is allowed to contain. The fixed
//! width makes lexicographic order equal sequence order.

use tracing::warn;

const SEGMENT_SUFFIX: &str = ".wal";

/// The file name of segment `seq` whose first admissible entry index is
/// `index`.
pub(crate) fn wal_name(seq: u64, index: u64) -> String {
    format!("{seq:016x}-{index:016x}{SEGMENT_SUFFIX}")
}

/// Parse `(seq, first_index)` back out of a segment file name, or `None`
/// for anything that is not a well-formed segment name.
pub(crate) fn parse_wal_name(name: &str) -> Option<(u64, u64)> {
    let stem = name.strip_suffix(SEGMENT_SUFFIX)?;
    let (seq, index) = stem.split_once('-')?;
    if seq.len() != 16 || index.len() != 16 {
        return None;
    }
    let seq = u64::from_str_radix(seq, 16).ok()?;
    let index = u64::from_str_radix(index, 16).ok()?;
    Some((seq, index))
}

/// Filter a directory listing down to well-formed segment names, sorted by
/// sequence. Anything else in the directory is reported and ignored.
pub(crate) fn check_wal_names(names: Vec<String>) -> Vec<String> {
    let mut wnames: Vec<String> = names
        .into_iter()
        .filter(|name| {
            let ok = parse_wal_name(name).is_some();
            if !ok {
                warn!(file = %name, "ignoring file in wal directory");
            }
            ok
        })
        .collect();
    // Fixed-width hex: lexicographic order is sequence order.
    wnames.sort();
    wnames
}

/// True iff the sequence numbers across `names` increase by exactly one.
pub(crate) fn is_valid_seq(names: &[String]) -> bool {
    let mut last: Option<u64> = None;
    for name in names {
        let Some((seq, _)) = parse_wal_name(name) else {
            return false;
        };
        if let Some(prev) = last {
            if seq != prev + 1 {
                return false;
            }
        }
        last = Some(seq);
    }
    true
}

/// The largest position in `names` whose first index is at or below
/// `index`, or `None` when no segment covers it.
///
/// `names` must be well-formed and sorted; first indices are then
/// non-decreasing, so a binary search applies.
pub(crate) fn search_index(names: &[String], index: u64) -> Option<usize> {
    let n = names.partition_point(|name| {
        parse_wal_name(name).is_some_and(|(_, first)| first <= index)
    });
    n.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_fixed_width_hex() {
        assert_eq!(wal_name(0, 0), "0000000000000000-0000000000000000.wal");
        assert_eq!(wal_name(5, 0x20), "0000000000000005-0000000000000020.wal");
    }

    #[test]
    fn parse_roundtrip() {
        for (seq, index) in [(0, 0), (1, 1), (0xab, 0xcdef), (u64::MAX, u64::MAX)] {
            assert_eq!(parse_wal_name(&wal_name(seq, index)), Some((seq, index)));
        }
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for bad in [
            "",
            "0000000000000000.wal",
            "0000000000000000-0000000000000000",
            "0000000000000000-0000000000000000.snap",
            "00-01.wal",
            "000000000000000g-0000000000000000.wal",
        ] {
            assert_eq!(parse_wal_name(bad), None, "accepted {bad:?}");
        }
    }

    #[test]
    fn check_filters_and_sorts() {
        let got = check_wal_names(vec![
            wal_name(2, 20),
            "lost+found".to_string(),
            wal_name(0, 0),
            wal_name(1, 10),
            "0.tmp".to_string(),
        ]);
        assert_eq!(got, vec![wal_name(0, 0), wal_name(1, 10), wal_name(2, 20)]);
    }

    #[test]
    fn valid_seq_requires_increments_of_one() {
        assert!(is_valid_seq(&[wal_name(0, 0)]));
        assert!(is_valid_seq(&[
            wal_name(3, 10),
            wal_name(4, 20),
            wal_name(5, 20),
        ]));
        assert!(!is_valid_seq(&[wal_name(0, 0), wal_name(2, 10)]));
        assert!(!is_valid_seq(&[wal_name(1, 0), wal_name(1, 1)]));
    }

    #[test]
    fn search_finds_covering_segment() {
        let list = [wal_name(0, 0), wal_name(1, 10), wal_name(2, 20)];
        assert_eq!(search_index(&list, 0), Some(0));
        assert_eq!(search_index(&list, 5), Some(0));
        assert_eq!(search_index(&list, 10), Some(1));
        assert_eq!(search_index(&list, 19), Some(1));
        assert_eq!(search_index(&list, 20), Some(2));
        assert_eq!(search_index(&list, u64::MAX), Some(2));
    }

    #[test]
    fn search_fails_below_first_segment() {
        let list = [wal_name(1, 5), wal_name(2, 10)];
        assert_eq!(search_index(&list, 4), None);
        assert_eq!(search_index(&[], 0), None);
    }
}
