use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::renderer::MatchStrategy;

const DEFAULT_CONFIG_FILE: &str = "tour_scraper.toml";
const ENV_PREFIX: &str = "TOUR";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid {field} pattern: {source}")]
    Pattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recovery: RecoverySettings,
    pub session: SessionSettings,
    pub batch: BatchSettings,
    pub renderer: RendererSettings,
    pub db_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recovery: RecoverySettings::default(),
            session: SessionSettings::default(),
            batch: BatchSettings::default(),
            renderer: RendererSettings::default(),
            db_path: PathBuf::from("data/tour.sqlite"),
        }
    }
}

/// Vocabularies and window parameters for field recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub venue_keywords: Vec<String>,
    pub skip_terms: Vec<String>,
    pub date_pattern: String,
    pub location_pattern: String,
    pub window_radius: usize,
    pub min_venue_len: usize,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            venue_keywords: strings(&[
                "Center", "Centre", "Church", "Hall", "Theater", "Theatre", "Venue", "Club",
                "Arena", "Stadium", "Baptist", "Civic", "Auditorium", "Amphitheater",
                "Amphitheatre", "Ballroom", "Pavilion", "Chapel", "Cathedral", "Tabernacle",
                "Coliseum", "Fairgrounds", "Opry", "Saloon", "Tavern", "Lounge",
            ]),
            skip_terms: strings(&[
                "Tickets", "Follow", "Show More", "More Dates", "I Was There", "RSVP",
                "Notify Me", "Set Reminder", "Share", "Download the app", "Sign Up",
                "Log In", "Upcoming", "Past",
            ]),
            date_pattern: concat!(
                r"(?i)\b(jan(uary)?|feb(ruary)?|mar(ch)?|apr(il)?|may|june?|july?|aug(ust)?",
                r"|sep(t(ember)?)?|oct(ober)?|nov(ember)?|dec(ember)?)\b",
            )
            .into(),
            location_pattern: r"^\p{Lu}[\p{L}.'\- ]*, [A-Z]{2}$".into(),
            window_radius: 3,
            min_venue_len: 6,
        }
    }
}

/// Page interaction limits, delays and the ordered element strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_pages: usize,
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub load_timeout_ms: u64,
    pub reveal_settle_ms: u64,
    pub page_settle_ms: u64,
    pub more_settle_ms: u64,
    pub reveal_past: Vec<MatchStrategy>,
    pub load_more: Vec<MatchStrategy>,
    pub block_phrases: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_pages: 3,
            attempts: 2,
            retry_delay_ms: 5_000,
            load_timeout_ms: 15_000,
            reveal_settle_ms: 3_000,
            page_settle_ms: 2_000,
            more_settle_ms: 3_000,
            reveal_past: vec![
                MatchStrategy::Exact { text: "Past".into() },
                MatchStrategy::Contains { text: "past".into() },
                MatchStrategy::Scoped {
                    region: "nav, header, [role=tablist]".into(),
                    text: "past".into(),
                },
            ],
            load_more: vec![
                MatchStrategy::Exact { text: "More Dates".into() },
                MatchStrategy::Contains { text: "more dates".into() },
                MatchStrategy::Scoped {
                    region: "main".into(),
                    text: "show more dates".into(),
                },
            ],
            block_phrases: strings(&[
                "access denied",
                "are you a robot",
                "verify you are human",
                "unusual traffic",
                "request blocked",
                "captcha",
                "too many requests",
            ]),
        }
    }
}

impl SessionSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn reveal_settle(&self) -> Duration {
        Duration::from_millis(self.reveal_settle_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn more_settle(&self) -> Duration {
        Duration::from_millis(self.more_settle_ms)
    }
}

/// Inter-target jitter range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    Http,
    Chrome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub kind: RendererKind,
    pub stealth: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub request_timeout_ms: u64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            kind: RendererKind::Http,
            stealth: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .into(),
            window_width: 1920,
            window_height: 1080,
            request_timeout_ms: 30_000,
        }
    }
}

impl Settings {
    /// Defaults, then the config file (explicit path or `tour_scraper.toml` if present),
    /// then `TOUR__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Compile-check the configured patterns and reject limits that would make
    /// a session do nothing, so bad values fail at startup.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.session.max_pages == 0 {
            return Err(SettingsError::Invalid {
                field: "session.max_pages",
                reason: "must be at least 1",
            });
        }
        if self.session.attempts == 0 {
            return Err(SettingsError::Invalid {
                field: "session.attempts",
                reason: "must be at least 1",
            });
        }
        if self.batch.min_delay_ms > self.batch.max_delay_ms {
            return Err(SettingsError::Invalid {
                field: "batch.min_delay_ms",
                reason: "must not exceed batch.max_delay_ms",
            });
        }
        regex::Regex::new(&self.recovery.date_pattern).map_err(|source| SettingsError::Pattern {
            field: "date",
            source,
        })?;
        regex::Regex::new(&self.recovery.location_pattern).map_err(|source| {
            SettingsError::Pattern {
                field: "location",
                source,
            }
        })?;
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
