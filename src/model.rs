use serde::{Deserialize, Serialize};

pub const ADDRESS_NOT_FOUND: &str = "Not specified";
pub const DATE_NOT_FOUND: &str = "Date not found";

/// One recovered listing. Fields are never empty: unresolved address and date
/// carry the sentinels above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    entity_name: String,
    venue_name: String,
    venue_address: String,
    event_date: String,
}

impl EventRecord {
    /// Returns `None` when the entity or venue is blank after trimming.
    pub fn new(
        entity_name: &str,
        venue_name: &str,
        venue_address: Option<&str>,
        event_date: Option<&str>,
    ) -> Option<Self> {
        let entity_name = entity_name.trim();
        let venue_name = venue_name.trim();
        if entity_name.is_empty() || venue_name.is_empty() {
            return None;
        }

        Some(Self {
            entity_name: entity_name.to_string(),
            venue_name: venue_name.to_string(),
            venue_address: or_sentinel(venue_address, ADDRESS_NOT_FOUND),
            event_date: or_sentinel(event_date, DATE_NOT_FOUND),
        })
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn venue_name(&self) -> &str {
        &self.venue_name
    }

    pub fn venue_address(&self) -> &str {
        &self.venue_address
    }

    pub fn event_date(&self) -> &str {
        &self.event_date
    }

    pub fn has_address(&self) -> bool {
        self.venue_address != ADDRESS_NOT_FOUND
    }

    pub fn has_date(&self) -> bool {
        self.event_date != DATE_NOT_FOUND
    }
}

fn or_sentinel(value: Option<&str>, sentinel: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => sentinel.to_string(),
    }
}
