pub mod http;

#[cfg(feature = "chrome")]
pub mod chrome;

#[cfg(test)]
pub mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::{RendererKind, RendererSettings};

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("page load timed out")]
    LoadTimeout,

    #[error("no element matched {0}")]
    ElementNotFound(String),

    #[error("could not activate element: {0}")]
    ActivationFailed(String),

    #[error("renderer failed to start: {0}")]
    RendererInitFailed(String),

    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// One way of locating a clickable control by its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Own text equals `text` exactly.
    Exact { text: String },
    /// Own text contains `text`, case-insensitive.
    Contains { text: String },
    /// Like `Contains`, restricted to elements under the `region` CSS selector.
    Scoped { region: String, text: String },
}

impl MatchStrategy {
    /// CSS selector the search is confined to, if any.
    pub fn region(&self) -> Option<&str> {
        match self {
            MatchStrategy::Scoped { region, .. } => Some(region),
            _ => None,
        }
    }

    /// Compare against an element's own text. Region scoping is left to the renderer.
    pub fn matches_text(&self, own_text: &str) -> bool {
        let own = own_text.trim();
        match self {
            MatchStrategy::Exact { text } => own == text,
            MatchStrategy::Contains { text } | MatchStrategy::Scoped { text, .. } => {
                own.to_lowercase().contains(&text.to_lowercase())
            }
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStrategy::Exact { text } => write!(f, "exact {text:?}"),
            MatchStrategy::Contains { text } => write!(f, "contains {text:?}"),
            MatchStrategy::Scoped { region, text } => write!(f, "{text:?} within {region:?}"),
        }
    }
}

/// Opaque reference to a located element, valid until the next navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle(pub String);

/// A live page session driven by the state machine.
#[async_trait]
pub trait Renderer: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Visible text of the whole page.
    async fn current_text(&mut self) -> Result<String>;

    async fn current_markup(&mut self) -> Result<String>;

    /// First element that matches any strategy, tried in order, and is visible and enabled.
    async fn find_first_visible_enabled(
        &mut self,
        strategies: &[MatchStrategy],
    ) -> Result<Option<Handle>>;

    async fn activate(&mut self, handle: &Handle) -> Result<()>;

    async fn title(&mut self) -> Result<String>;

    async fn current_url(&mut self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Launches a fresh renderer session per target attempt.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Renderer>>;
}

/// Build the factory selected in settings.
pub fn factory(cfg: &RendererSettings) -> anyhow::Result<Arc<dyn RendererFactory>> {
    match cfg.kind {
        RendererKind::Http => Ok(Arc::new(http::HttpFactory::new(cfg.clone()))),
        #[cfg(feature = "chrome")]
        RendererKind::Chrome => Ok(Arc::new(chrome::ChromeFactory::new(cfg.clone()))),
        #[cfg(not(feature = "chrome"))]
        RendererKind::Chrome => {
            anyhow::bail!("chrome renderer not available: rebuild with `--features chrome`")
        }
    }
}
