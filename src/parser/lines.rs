use regex::{Regex, RegexBuilder};

use crate::settings::{RecoverySettings, SettingsError};

/// What a line looks like. A line can carry several tags at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tags {
    pub venue: bool,
    pub date: bool,
    pub location: bool,
    pub skip: bool,
}

#[derive(Debug, Clone)]
pub struct CandidateLine<'a> {
    pub index: usize,
    pub text: &'a str,
    pub tags: Tags,
}

impl CandidateLine<'_> {
    pub fn is_anchor(&self) -> bool {
        self.tags.venue && !self.tags.skip
    }
}

#[derive(Debug, Clone, Copy)]
enum Tag {
    Venue,
    Date,
    Location,
    Skip,
}

#[derive(Debug, Clone)]
enum Rule {
    /// Case-insensitive substring match against any of the (lowercased) terms.
    AnyTerm(Vec<String>),
    Pattern(Regex),
}

impl Rule {
    fn matches(&self, line: &str, lower: &str) -> bool {
        match self {
            Rule::AnyTerm(terms) => terms.iter().any(|t| lower.contains(t.as_str())),
            Rule::Pattern(re) => re.is_match(line),
        }
    }
}

/// Ordered list of classification rules compiled from configuration.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    rules: Vec<(Tag, Rule)>,
}

impl LineClassifier {
    pub fn new(cfg: &RecoverySettings) -> Result<Self, SettingsError> {
        let venue = Rule::AnyTerm(
            cfg.venue_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        );
        let date = Rule::Pattern(Regex::new(&cfg.date_pattern).map_err(|source| {
            SettingsError::Pattern {
                field: "date",
                source,
            }
        })?);
        let location = Rule::Pattern(Regex::new(&cfg.location_pattern).map_err(|source| {
            SettingsError::Pattern {
                field: "location",
                source,
            }
        })?);

        let mut rules = vec![
            (Tag::Venue, venue),
            (Tag::Date, date),
            (Tag::Location, location),
        ];
        if let Some(skip) = skip_rule(&cfg.skip_terms)? {
            rules.push((Tag::Skip, skip));
        }

        Ok(Self { rules })
    }

    pub fn tags(&self, line: &str) -> Tags {
        let lower = line.to_lowercase();
        let mut tags = Tags::default();
        for (tag, rule) in &self.rules {
            if !rule.matches(line, &lower) {
                continue;
            }
            match tag {
                Tag::Venue => tags.venue = true,
                Tag::Date => tags.date = true,
                Tag::Location => tags.location = true,
                Tag::Skip => tags.skip = true,
            }
        }
        tags
    }

    /// Split into trimmed non-empty lines and tag each one. `index` is the
    /// position among the kept lines.
    pub fn classify<'a>(&self, raw_text: &'a str) -> Vec<CandidateLine<'a>> {
        raw_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(index, text)| CandidateLine {
                index,
                text,
                tags: self.tags(text),
            })
            .collect()
    }
}

/// Skip terms match on word boundaries so "Past" does not hide "Pasture Hall".
fn skip_rule(terms: &[String]) -> Result<Option<Rule>, SettingsError> {
    let alternation: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if alternation.is_empty() {
        return Ok(None);
    }

    let re = RegexBuilder::new(&format!(r"\b(?:{})\b", alternation.join("|")))
        .case_insensitive(true)
        .build()
        .map_err(|source| SettingsError::Pattern {
            field: "skip",
            source,
        })?;
    Ok(Some(Rule::Pattern(re)))
}
