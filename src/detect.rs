//! Timestamp-based change detection.

use chrono::{DateTime, Utc};

/// Outcome of comparing a document's modified time with the recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Never synced before.
    New,
    /// Modified strictly after the last sync.
    Modified { previous: DateTime<Utc> },
    Unchanged,
}

impl Change {
    pub fn needs_sync(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

/// Decide whether a document must be converted.
///
/// The modified time is the only signal. A recorded time equal to or later
/// than `current` counts as unchanged.
pub fn detect(current: DateTime<Utc>, recorded: Option<DateTime<Utc>>) -> Change {
    match recorded {
        None => Change::New,
        Some(previous) if current > previous => Change::Modified { previous },
        Some(_) => Change::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 26, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_first_sight_is_new() {
        assert_eq!(detect(at(10), None), Change::New);
        assert!(detect(at(10), None).needs_sync());
    }

    #[test]
    fn test_newer_is_modified() {
        let change = detect(at(11), Some(at(10)));
        assert_eq!(change, Change::Modified { previous: at(10) });
        assert!(change.needs_sync());
    }

    #[test]
    fn test_equal_is_unchanged() {
        assert_eq!(detect(at(10), Some(at(10))), Change::Unchanged);
        assert!(!detect(at(10), Some(at(10))).needs_sync());
    }

    #[test]
    fn test_older_is_unchanged() {
        assert_eq!(detect(at(9), Some(at(10))), Change::Unchanged);
    }
}
