use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::EventRecord;
use crate::parser::Recovery;
use crate::renderer::{MatchStrategy, RenderError, Renderer, RendererFactory};
use crate::settings::SessionSettings;
use crate::target::Target;

const READY_POLL: Duration = Duration::from_millis(250);

/// Where a single target's page interaction stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Init,
    Loaded,
    PastRevealed,
    PastUnavailable,
    Extracting,
    Paginating,
    Done,
    Failed,
}

/// Fatal-to-target failures. Strategy misses never surface here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("renderer failed to start: {0}")]
    RendererInit(String),

    #[error("page did not load within {0:?}")]
    LoadTimeout(Duration),

    #[error("blocked by anti-automation response ({0:?})")]
    Blocked(String),

    #[error("navigation failed: {0}")]
    Navigation(String),
}

impl TargetError {
    /// A detected block is not retried; hitting the page again right away only
    /// repeats the denial.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TargetError::Blocked(_))
    }

    fn from_render(err: RenderError, load_timeout: Duration) -> Self {
        match err {
            RenderError::LoadTimeout => TargetError::LoadTimeout(load_timeout),
            RenderError::RendererInitFailed(m) => TargetError::RendererInit(m),
            other => TargetError::Navigation(other.to_string()),
        }
    }
}

/// What one successful attempt produced.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub records: Vec<EventRecord>,
    pub pages: usize,
    pub past_revealed: bool,
    pub attempts: u32,
    pub states: Vec<PageState>,
}

/// Drives one target's page through reveal → extract → paginate.
pub struct Session {
    cfg: SessionSettings,
    recovery: Recovery,
    factory: Arc<dyn RendererFactory>,
}

impl Session {
    pub fn new(cfg: SessionSettings, recovery: Recovery, factory: Arc<dyn RendererFactory>) -> Self {
        Self {
            cfg,
            recovery,
            factory,
        }
    }

    /// Up to `attempts` tries, each on a fresh renderer, with a fixed delay between.
    pub async fn run(&self, target: &Target) -> Result<TargetOutcome, TargetError> {
        let attempts = self.cfg.attempts;
        let mut attempt = 1;

        loop {
            match self.attempt(target).await {
                Ok(mut outcome) => {
                    outcome.attempts = attempt;
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        artist = %target.name,
                        "attempt {}/{} failed: {}; retrying in {:.1}s",
                        attempt,
                        attempts,
                        e,
                        self.cfg.retry_delay().as_secs_f64()
                    );
                    tokio::time::sleep(self.cfg.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, target: &Target) -> Result<TargetOutcome, TargetError> {
        let mut renderer = self
            .factory
            .launch()
            .await
            .map_err(|e| TargetError::from_render(e, self.cfg.load_timeout()))?;

        let mut states = Vec::new();
        let result = self.drive(renderer.as_mut(), target, &mut states).await;

        if let Err(e) = renderer.close().await {
            warn!(artist = %target.name, "renderer close failed: {}", e);
        }

        match result {
            Ok((records, pages, past_revealed)) => {
                info!(
                    artist = %target.name,
                    pages,
                    past_revealed,
                    "found {} concerts",
                    records.len()
                );
                Ok(TargetOutcome {
                    records,
                    pages,
                    past_revealed,
                    attempts: 1,
                    states,
                })
            }
            Err(e) => {
                states.push(PageState::Failed);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        r: &mut dyn Renderer,
        target: &Target,
        states: &mut Vec<PageState>,
    ) -> Result<(Vec<EventRecord>, usize, bool), TargetError> {
        let mut records = Vec::new();
        let mut pages = 0usize;
        let mut past_revealed = false;
        let mut state = PageState::Init;

        loop {
            states.push(state);
            state = match state {
                PageState::Init => {
                    self.load(r, target).await?;
                    PageState::Loaded
                }
                PageState::Loaded => {
                    if self.activate_first(r, &self.cfg.reveal_past, target).await {
                        past_revealed = true;
                        tokio::time::sleep(self.cfg.reveal_settle()).await;
                        PageState::PastRevealed
                    } else {
                        warn!(artist = %target.name, "could not open Past tab, using current listing");
                        PageState::PastUnavailable
                    }
                }
                PageState::PastRevealed | PageState::PastUnavailable => PageState::Extracting,
                PageState::Extracting => {
                    tokio::time::sleep(self.cfg.page_settle()).await;
                    match self.sample(r).await {
                        Ok(text) => {
                            pages += 1;
                            let found = self.recovery.extract(&text, &target.name);
                            if found.is_empty() {
                                let bytes = r.current_markup().await.map(|m| m.len()).unwrap_or(0);
                                warn!(artist = %target.name, page = pages, bytes, "no venue lines recognized");
                            } else {
                                debug!(artist = %target.name, page = pages, "page yielded {} candidates", found.len());
                            }
                            records.extend(found);
                            if pages >= self.cfg.max_pages {
                                PageState::Done
                            } else {
                                PageState::Paginating
                            }
                        }
                        Err(e @ TargetError::Blocked(_)) => return Err(e),
                        Err(e) if pages == 0 => return Err(e),
                        Err(e) => {
                            warn!(artist = %target.name, page = pages + 1, "keeping partial results: {}", e);
                            PageState::Done
                        }
                    }
                }
                PageState::Paginating => {
                    if self.activate_first(r, &self.cfg.load_more, target).await {
                        tokio::time::sleep(self.cfg.more_settle()).await;
                        PageState::Extracting
                    } else {
                        info!(artist = %target.name, "no more pages after {}", pages);
                        PageState::Done
                    }
                }
                PageState::Done => break,
                PageState::Failed => unreachable!("failures return early"),
            };
        }

        Ok((records, pages, past_revealed))
    }

    /// Navigate and wait, bounded, until the page shows any text at all.
    async fn load(&self, r: &mut dyn Renderer, target: &Target) -> Result<(), TargetError> {
        let timeout = self.cfg.load_timeout();
        let ready = async {
            r.navigate(&target.url).await?;
            loop {
                let text = r.current_text().await?;
                if !text.trim().is_empty() {
                    return Ok::<String, RenderError>(text);
                }
                tokio::time::sleep(READY_POLL).await;
            }
        };

        let text = match tokio::time::timeout(timeout, ready).await {
            Ok(res) => res.map_err(|e| TargetError::from_render(e, timeout))?,
            Err(_) => return Err(TargetError::LoadTimeout(timeout)),
        };

        let title = r.title().await.unwrap_or_default();
        if let Some(phrase) = self.block_phrase(&title).or_else(|| self.block_phrase(&text)) {
            return Err(TargetError::Blocked(phrase));
        }
        let landed = r.current_url().await.unwrap_or_default();
        info!(artist = %target.name, title = %title, url = %landed, "page loaded");
        Ok(())
    }

    /// Current text, rejected if it reads like an access-denial page.
    async fn sample(&self, r: &mut dyn Renderer) -> Result<String, TargetError> {
        let text = r
            .current_text()
            .await
            .map_err(|e| TargetError::from_render(e, self.cfg.load_timeout()))?;
        match self.block_phrase(&text) {
            Some(phrase) => Err(TargetError::Blocked(phrase)),
            None => Ok(text),
        }
    }

    fn block_phrase(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        self.cfg
            .block_phrases
            .iter()
            .find(|p| !p.is_empty() && lower.contains(&p.to_lowercase()))
            .cloned()
    }

    /// Try each strategy in order; the first visible, enabled match that activates wins.
    async fn activate_first(
        &self,
        r: &mut dyn Renderer,
        strategies: &[MatchStrategy],
        target: &Target,
    ) -> bool {
        for strategy in strategies {
            let handle = match r.find_first_visible_enabled(std::slice::from_ref(strategy)).await {
                Ok(Some(h)) => h,
                Ok(None) => {
                    debug!(artist = %target.name, "no match for {}", strategy);
                    continue;
                }
                Err(e) => {
                    debug!(artist = %target.name, "lookup for {} failed: {}", strategy, e);
                    continue;
                }
            };

            match r.activate(&handle).await {
                Ok(()) => {
                    info!(artist = %target.name, "clicked {}", strategy);
                    return true;
                }
                Err(e) => warn!(artist = %target.name, "activation via {} failed: {}", strategy, e),
            }
        }
        false
    }
}
