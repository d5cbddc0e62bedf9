pub mod lines;
pub mod window;

use std::collections::HashSet;

use crate::model::EventRecord;
use crate::settings::{RecoverySettings, SettingsError};
use lines::{CandidateLine, LineClassifier};

/// Field recovery over one rendered text sample:
/// lines → tagged candidates → venue anchors → records from each anchor's window.
#[derive(Debug, Clone)]
pub struct Recovery {
    classifier: LineClassifier,
    radius: usize,
    min_venue_len: usize,
}

impl Recovery {
    pub fn new(cfg: &RecoverySettings) -> Result<Self, SettingsError> {
        Ok(Self {
            classifier: LineClassifier::new(cfg)?,
            radius: cfg.window_radius,
            min_venue_len: cfg.min_venue_len.max(1),
        })
    }

    /// Records in input line order. Never fails; unusable lines are skipped.
    pub fn extract(&self, raw_text: &str, entity_name: &str) -> Vec<EventRecord> {
        let lines = self.classifier.classify(raw_text);
        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();

        for anchor in lines.iter().filter(|l| l.is_anchor()) {
            let venue = collapse_whitespace(anchor.text);
            if venue.chars().count() < self.min_venue_len || seen.contains(&venue) {
                continue;
            }

            let date = self.corroborate(&lines, anchor.index, |l| l.tags.date);
            let address = self.corroborate(&lines, anchor.index, |l| l.tags.location);

            if let Some(record) = EventRecord::new(entity_name, &venue, address, date) {
                seen.insert(venue);
                records.push(record);
            }
        }

        records
    }

    /// First matching line in the anchor's window, excluding the anchor itself.
    fn corroborate<'a>(
        &self,
        lines: &[CandidateLine<'a>],
        anchor: usize,
        want: impl Fn(&CandidateLine<'a>) -> bool,
    ) -> Option<&'a str> {
        // a venue line never supplies its own date or location
        window::find_nearest(lines, anchor, self.radius, |l| l.index != anchor && want(l))
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ADDRESS_NOT_FOUND, DATE_NOT_FOUND};

    fn recovery(radius: usize) -> Recovery {
        Recovery::new(&RecoverySettings {
            window_radius: radius,
            ..RecoverySettings::default()
        })
        .unwrap()
    }

    fn listing_page() -> String {
        [
            "Bandsintown",      // 0
            "Sign Up",          // 1
            "Gospel Harmony",   // 2
            "Concerts",         // 3
            "Upcoming",         // 4
            "Past",             // 5
            "Photos",           // 6
            "About",            // 7
            "Similar Artists",  // 8
            "Gospel Quartet",   // 9
            "Riverside Baptist Church", // 10
            "Gospel Quartet",   // 11
            "JUN 12",           // 12
            "Nashville, TN",    // 13
            "I Was There",      // 14
        ]
        .join("\n")
    }

    #[test]
    fn anchor_with_date_and_location_in_window() {
        let records = recovery(4).extract(&listing_page(), "Gospel Harmony");
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.entity_name(), "Gospel Harmony");
        assert_eq!(r.venue_name(), "Riverside Baptist Church");
        assert_eq!(r.event_date(), "JUN 12");
        assert_eq!(r.venue_address(), "Nashville, TN");
    }

    #[test]
    fn narrow_window_falls_back_to_sentinels() {
        let records = recovery(1).extract(&listing_page(), "Gospel Harmony");
        assert_eq!(records[0].event_date(), DATE_NOT_FOUND);
        assert_eq!(records[0].venue_address(), ADDRESS_NOT_FOUND);
    }

    #[test]
    fn multiple_listings_in_order() {
        let text = "MAY 03\nRyman Auditorium\nNashville, TN\nTickets\n\
                    MAY 10\nFox Theatre\nAtlanta, GA\nTickets\n\
                    MAY 17\nCorinth Civic Center\nCorinth, MS";
        let records = recovery(1).extract(text, "Artist");
        let venues: Vec<&str> = records.iter().map(|r| r.venue_name()).collect();
        assert_eq!(venues, ["Ryman Auditorium", "Fox Theatre", "Corinth Civic Center"]);
        assert_eq!(records[1].event_date(), "MAY 10");
        assert_eq!(records[2].venue_address(), "Corinth, MS");
    }

    #[test]
    fn accented_city_is_a_location() {
        let text = "JUN 12\nSalle Wilfrid-Pelletier Theatre\nMontréal, QC";
        let records = recovery(3).extract(text, "Artist");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].venue_address(), "Montréal, QC");
        assert_eq!(records[0].event_date(), "JUN 12");
    }

    #[test]
    fn overlapping_windows_share_a_date() {
        let text = "APR 4\nFirst Baptist Church\nGrace Chapel Hall";
        let records = recovery(2).extract(text, "Artist");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_date(), "APR 4");
        assert_eq!(records[1].event_date(), "APR 4");
    }

    #[test]
    fn skip_short_and_repeated_anchors() {
        let text = "Get Tickets at the Arena\nHall\nCivic   Center\nCivic Center\nFollow the Club";
        let records = recovery(2).extract(text, "Artist");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].venue_name(), "Civic Center");
    }

    #[test]
    fn no_venue_lines_is_empty() {
        let text = "Home\nJUN 12\nNashville, TN";
        assert!(recovery(3).extract(text, "Artist").is_empty());
        assert!(recovery(3).extract("", "Artist").is_empty());
    }

    #[test]
    fn arbitrary_input_never_yields_empty_venue() {
        let long = "x Arena ".repeat(500);
        let inputs = [
            "\u{0}\u{feff}Hall\r\n\r\n   \t",
            "Théâtre Hall, QC\n\n\nDÉC 3",
            "Center\nCenter\nCenter",
            long.as_str(),
            "🎸 Club 🎸\n2024",
        ];
        let r = recovery(3);
        for input in inputs {
            for rec in r.extract(input, "Artist") {
                assert!(!rec.venue_name().trim().is_empty());
                assert!(!rec.event_date().is_empty());
                assert!(!rec.venue_address().is_empty());
            }
        }
    }
}
