use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static ARTIST_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?bandsintown\.com(?:/[a-z]{2})?/a/(\d+)(?:-([A-Za-z0-9_%'-]*))?/?$")
        .unwrap()
});

/// How many offending addresses to quote in a rejection message.
const QUOTED_INVALID: usize = 3;

/// A resolved artist page. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl Target {
    /// Resolve an artist page address. Query strings and fragments are ignored
    /// for matching but the original address is kept for navigation.
    pub fn resolve(address: &str) -> Option<Target> {
        let url = address.trim();
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let caps = ARTIST_URL_RE.captures(path)?;

        let id = caps[1].to_string();
        let name = caps
            .get(2)
            .map(|m| title_case(&m.as_str().replace("%20", "-")))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| id.clone());

        Some(Target {
            id,
            name,
            url: url.to_string(),
        })
    }
}

/// Result of validating a list of submitted addresses.
#[derive(Debug, Default)]
pub struct Validation {
    pub targets: Vec<Target>,
    pub invalid: Vec<String>,
}

impl Validation {
    /// Human-readable rejection message, quoting the first few offenders.
    pub fn invalid_message(&self) -> String {
        let shown: Vec<&str> = self
            .invalid
            .iter()
            .take(QUOTED_INVALID)
            .map(String::as_str)
            .collect();
        let mut msg = format!(
            "Invalid URLs (need format like 'https://www.bandsintown.com/a/147132-artist-name'): {}",
            shown.join(", ")
        );
        if self.invalid.len() > QUOTED_INVALID {
            msg.push_str(&format!(" and {} more", self.invalid.len() - QUOTED_INVALID));
        }
        msg
    }
}

/// Split submitted addresses into resolved targets and invalid entries.
/// Blank lines are ignored, never reported.
pub fn validate<S: AsRef<str>>(addresses: &[S]) -> Validation {
    let mut v = Validation::default();
    for raw in addresses {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            continue;
        }
        match Target::resolve(raw) {
            Some(t) => v.targets.push(t),
            None => v.invalid.push(raw.to_string()),
        }
    }
    v
}

/// `the-black-keys` → `The Black Keys`
fn title_case(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_name_from_slug() {
        let t = Target::resolve("https://www.bandsintown.com/a/147132-the-black-keys").unwrap();
        assert_eq!(t.id, "147132");
        assert_eq!(t.name, "The Black Keys");
    }

    #[test]
    fn ignores_query_string() {
        let url = "https://www.bandsintown.com/a/1234-jo-dee?came_from=257&utm_medium=web";
        let t = Target::resolve(url).unwrap();
        assert_eq!(t.name, "Jo Dee");
        assert_eq!(t.url, url);
    }

    #[test]
    fn slugless_falls_back_to_id() {
        let t = Target::resolve("https://bandsintown.com/a/998877").unwrap();
        assert_eq!(t.name, "998877");
    }

    #[test]
    fn rejects_other_sites_and_shapes() {
        assert!(Target::resolve("https://example.com/a/1234-band").is_none());
        assert!(Target::resolve("https://www.bandsintown.com/a/band-name").is_none());
        assert!(Target::resolve("https://www.bandsintown.com/e/1234-some-event").is_none());
    }

    #[test]
    fn invalid_message_truncates() {
        let v = validate(&["a", "b", "", "c", "d", "e"]);
        assert!(v.targets.is_empty());
        assert_eq!(v.invalid.len(), 5);
        let msg = v.invalid_message();
        assert!(msg.ends_with("a, b, c and 2 more"), "{msg}");
    }
}
