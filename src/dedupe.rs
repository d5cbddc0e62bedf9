use std::collections::HashSet;

use crate::model::EventRecord;
use crate::parser::collapse_whitespace;

type Key = (String, String);

/// Comparison form only: trimmed, single-spaced, lowercased.
pub fn normalize(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

fn key(r: &EventRecord) -> Key {
    (normalize(r.venue_name()), normalize(r.event_date()))
}

/// Drop records whose normalized `(venue, date)` was already seen, keeping the
/// first occurrence and its original casing.
pub fn dedupe(records: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut acc = Accumulator::default();
    acc.extend(records);
    acc.into_records()
}

/// Incremental form used across a whole batch.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    seen: HashSet<Key>,
    records: Vec<EventRecord>,
}

impl Accumulator {
    /// Returns how many of `records` were new.
    pub fn extend(&mut self, records: impl IntoIterator<Item = EventRecord>) -> usize {
        let before = self.records.len();
        for r in records {
            if self.seen.insert(key(&r)) {
                self.records.push(r);
            }
        }
        self.records.len() - before
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn into_records(self) -> Vec<EventRecord> {
        self.records
    }
}
