//! Append-only event history with newest-wins header resolution.

use crate::error::{CallModelError, ModelResult};
use crate::event::EventRecord;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;

/// Ordered collection of [`EventRecord`]s for one logical entity.
///
/// New records are folded in at the front, so position 0 is always the most
/// recent event. Header lookups scan newest→oldest and return the first
/// non-empty value — this models header values changing across the life of a
/// call or job, with the newest value shadowing older ones. Empty header
/// values are treated as absent and the scan continues.
///
/// The ledger never shrinks: records are appended for the owning entity's
/// lifetime and reclaimed with it.
///
/// # Concurrency
///
/// Interior `RwLock`: the expected discipline is a single writer (the event
/// dispatch task calling [`update`](Self::update)) with any number of
/// concurrent readers. The lock makes concurrent misuse safe rather than
/// merely documented.
#[derive(Default)]
pub struct EventLedger {
    records: RwLock<VecDeque<EventRecord>>,
}

impl EventLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger seeded with one initial record.
    pub fn with_seed(record: EventRecord) -> Self {
        let ledger = Self::new();
        ledger.update(record);
        ledger
    }

    /// Fold a record in as the newest entry. Never fails.
    pub fn update(&self, record: EventRecord) {
        self.records
            .write()
            .push_front(record);
    }

    /// Newest-wins header lookup across all folded records.
    ///
    /// Returns `None` if no record exposes a non-empty value for `key`
    /// (absence is not an error).
    pub fn get(&self, key: impl AsRef<str>) -> Option<String> {
        let key = key.as_ref();
        let records = self
            .records
            .read();
        records
            .iter()
            .find_map(|record| {
                record
                    .header(key)
                    .filter(|value| !value.is_empty())
                    .map(|value| value.to_string())
            })
    }

    /// Strict form of [`get`](Self::get) for identity-bearing fields.
    ///
    /// Fails with [`CallModelError::HeaderNotFound`] when no record carries a
    /// non-empty value for `key`.
    pub fn lookup(&self, key: impl AsRef<str>) -> ModelResult<String> {
        let key = key.as_ref();
        self.get(key)
            .ok_or_else(|| CallModelError::header_not_found(key))
    }

    /// Number of records folded so far.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .len()
    }

    /// Whether no records have been folded yet.
    pub fn is_empty(&self) -> bool {
        self.records
            .read()
            .is_empty()
    }

    /// Raw record at `index`, newest first.
    ///
    /// Bypasses key resolution; intended for introspection/debugging. Fails
    /// with [`CallModelError::IndexOutOfRange`] past the end.
    pub fn event_at(&self, index: usize) -> ModelResult<EventRecord> {
        let records = self
            .records
            .read();
        records
            .get(index)
            .cloned()
            .ok_or(CallModelError::IndexOutOfRange {
                index,
                len: records.len(),
            })
    }

    /// Raw records in `range`, newest-first indexing.
    pub fn slice(&self, range: Range<usize>) -> ModelResult<Vec<EventRecord>> {
        let records = self
            .records
            .read();
        if range.end > records.len() {
            return Err(CallModelError::IndexOutOfRange {
                index: range.end,
                len: records.len(),
            });
        }
        Ok(records
            .iter()
            .skip(range.start)
            .take(range.len())
            .cloned()
            .collect())
    }

    /// Copy of all records, newest first.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.records
            .read()
            .iter()
            .cloned()
            .collect()
    }
}

impl fmt::Debug for EventLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLedger")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> EventRecord {
        let mut r = EventRecord::new();
        for (k, v) in pairs {
            r.set_header(*k, *v);
        }
        r
    }

    #[test]
    fn newest_value_wins() {
        let ledger = EventLedger::with_seed(record(&[("Answer-State", "ringing")]));
        ledger.update(record(&[("Answer-State", "early")]));
        ledger.update(record(&[("Answer-State", "answered")]));

        assert_eq!(ledger.get("Answer-State"), Some("answered".into()));
    }

    #[test]
    fn empty_values_are_skipped() {
        let ledger = EventLedger::with_seed(record(&[("Hangup-Cause", "NORMAL_CLEARING")]));
        ledger.update(record(&[("Hangup-Cause", "")]));

        // the newest record's empty value does not shadow the older one
        assert_eq!(ledger.get("Hangup-Cause"), Some("NORMAL_CLEARING".into()));
    }

    #[test]
    fn get_returns_none_when_absent() {
        let ledger = EventLedger::with_seed(record(&[("Unique-ID", "u1")]));
        assert_eq!(ledger.get("Nonexistent"), None);
    }

    #[test]
    fn lookup_fails_fast_when_absent() {
        let ledger = EventLedger::new();
        let err = ledger
            .lookup("Unique-ID")
            .unwrap_err();
        assert!(matches!(
            err,
            CallModelError::HeaderNotFound { ref key } if key == "Unique-ID"
        ));
    }

    #[test]
    fn len_counts_seed_and_updates() {
        let unseeded = EventLedger::new();
        assert_eq!(unseeded.len(), 0);
        assert!(unseeded.is_empty());

        let ledger = EventLedger::with_seed(record(&[]));
        for _ in 0..3 {
            ledger.update(record(&[]));
        }
        assert_eq!(ledger.len(), 4);
        assert!(!ledger.is_empty());
    }

    #[test]
    fn position_zero_is_most_recent() {
        let ledger = EventLedger::with_seed(record(&[("Seq", "1")]));
        ledger.update(record(&[("Seq", "2")]));
        ledger.update(record(&[("Seq", "3")]));

        let newest = ledger
            .event_at(0)
            .unwrap();
        assert_eq!(newest.header("Seq"), Some("3"));
        let oldest = ledger
            .event_at(2)
            .unwrap();
        assert_eq!(oldest.header("Seq"), Some("1"));
    }

    #[test]
    fn event_at_out_of_range() {
        let ledger = EventLedger::with_seed(record(&[]));
        let err = ledger
            .event_at(1)
            .unwrap_err();
        assert!(matches!(
            err,
            CallModelError::IndexOutOfRange { index: 1, len: 1 }
        ));
    }

    #[test]
    fn slice_newest_first() {
        let ledger = EventLedger::new();
        for i in 0..5 {
            ledger.update(record(&[("Seq", &i.to_string())]));
        }

        let mid = ledger
            .slice(1..3)
            .unwrap();
        assert_eq!(mid.len(), 2);
        assert_eq!(mid[0].header("Seq"), Some("3"));
        assert_eq!(mid[1].header("Seq"), Some("2"));

        assert!(ledger
            .slice(3..6)
            .is_err());
    }

    #[test]
    fn snapshot_preserves_order() {
        let ledger = EventLedger::with_seed(record(&[("Seq", "1")]));
        ledger.update(record(&[("Seq", "2")]));

        let all = ledger.snapshot();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].header("Seq"), Some("2"));
        assert_eq!(all[1].header("Seq"), Some("1"));
    }

    #[test]
    fn concurrent_reads_during_updates() {
        use std::sync::Arc;

        let ledger = Arc::new(EventLedger::new());
        let writer = {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    ledger.update(record(&[("Seq", &i.to_string())]));
                }
            })
        };
        let reader = {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let _ = ledger.get("Seq");
                    let _ = ledger.len();
                }
            })
        };
        writer
            .join()
            .unwrap();
        reader
            .join()
            .unwrap();
        assert_eq!(ledger.len(), 1000);
        assert_eq!(ledger.get("Seq"), Some("999".into()));
    }
}
