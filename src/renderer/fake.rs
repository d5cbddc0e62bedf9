//! Scripted in-memory site for exercising the session and batch logic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{Handle, MatchStrategy, RenderError, Renderer, RendererFactory, Result};

const PAST_LABEL: &str = "Past";
const MORE_LABEL: &str = "More Dates";
const NAV: &[&str] = &["nav"];
const MAIN: &[&str] = &["main"];

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    /// Text before the history tab is opened.
    pub initial: String,
    /// Text after opening the history tab; `None` means there is no such tab.
    pub past: Option<String>,
    /// Text appended by each "More Dates" click.
    pub more: Vec<String>,
    pub past_activation_fails: bool,
    /// Consumed one per navigation before loads start succeeding.
    pub load_failures: Vec<RenderError>,
    /// Navigation never completes.
    pub hang: bool,
}

impl FakePage {
    pub fn listing(text: &str) -> Self {
        Self {
            initial: text.to_string(),
            ..Self::default()
        }
    }

    pub fn with_past(mut self, text: &str) -> Self {
        self.past = Some(text.to_string());
        self
    }

    pub fn with_more(mut self, text: &str) -> Self {
        self.more.push(text.to_string());
        self
    }
}

#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, FakePage>>,
    launch_failure: Mutex<Option<RenderError>>,
    gate: Option<Arc<Semaphore>>,
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub log: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, page: FakePage) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), page);
        self
    }

    /// Every navigation waits for a permit on `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_launches(&self, err: Option<RenderError>) {
        *self.launch_failure.lock().unwrap() = err;
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RendererFactory for Arc<FakeSite> {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.launch_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(FakeRenderer {
            site: Arc::clone(self),
            url: String::new(),
            page: None,
            revealed: false,
            clicks: 0,
            closed: false,
        }))
    }
}

pub struct FakeRenderer {
    site: Arc<FakeSite>,
    url: String,
    page: Option<FakePage>,
    revealed: bool,
    clicks: usize,
    closed: bool,
}

impl FakeRenderer {
    fn page(&self) -> Result<&FakePage> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::Navigation("nothing loaded".into()))
    }

    fn controls(&self) -> Vec<(&'static str, &'static [&'static str])> {
        let Some(page) = &self.page else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if page.past.is_some() && !self.revealed {
            out.push((PAST_LABEL, NAV));
        }
        if self.clicks < page.more.len() {
            out.push((MORE_LABEL, MAIN));
        }
        out
    }
}

/// Region names stand in for selectors: a scoped strategy lists them comma-separated.
fn in_region(strategy: &MatchStrategy, regions: &[&str]) -> bool {
    match strategy.region() {
        Some(scope) => regions.iter().any(|r| scope.split(',').any(|s| s.trim() == *r)),
        None => true,
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        if let Some(gate) = &self.site.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))?;
        }
        self.site.record(format!("navigate {url}"));

        let page = {
            let mut pages = self.site.pages.lock().unwrap();
            let page = pages
                .get_mut(url)
                .ok_or_else(|| RenderError::Navigation(format!("unknown page {url}")))?;
            if !page.load_failures.is_empty() {
                return Err(page.load_failures.remove(0));
            }
            page.clone()
        };

        if page.hang {
            std::future::pending::<()>().await;
        }

        self.url = url.to_string();
        self.page = Some(page);
        self.revealed = false;
        self.clicks = 0;
        Ok(())
    }

    async fn current_text(&mut self) -> Result<String> {
        let page = self.page()?;
        let mut text = match (&page.past, self.revealed) {
            (Some(past), true) => past.clone(),
            _ => page.initial.clone(),
        };
        for extra in page.more.iter().take(self.clicks) {
            text.push('\n');
            text.push_str(extra);
        }
        Ok(text)
    }

    async fn current_markup(&mut self) -> Result<String> {
        let text = self.current_text().await?;
        Ok(format!("<html><body><pre>{text}</pre></body></html>"))
    }

    async fn find_first_visible_enabled(
        &mut self,
        strategies: &[MatchStrategy],
    ) -> Result<Option<Handle>> {
        let controls = self.controls();
        for strategy in strategies {
            if let Some((label, _)) = controls
                .iter()
                .find(|(label, regions)| in_region(strategy, regions) && strategy.matches_text(label))
            {
                return Ok(Some(Handle(label.to_string())));
            }
        }
        Ok(None)
    }

    async fn activate(&mut self, handle: &Handle) -> Result<()> {
        self.site.record(format!("activate {}", handle.0));
        let page = self.page()?.clone();
        match handle.0.as_str() {
            PAST_LABEL if page.past_activation_fails => {
                Err(RenderError::ActivationFailed(handle.0.clone()))
            }
            PAST_LABEL => {
                self.revealed = true;
                Ok(())
            }
            MORE_LABEL if self.clicks < page.more.len() => {
                self.clicks += 1;
                Ok(())
            }
            other => Err(RenderError::ElementNotFound(other.to_string())),
        }
    }

    async fn title(&mut self) -> Result<String> {
        Ok("Fake Page".into())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.site.open.fetch_sub(1, Ordering::SeqCst);
            self.site.closes.fetch_add(1, Ordering::SeqCst);
            self.site.record("close".into());
        }
        Ok(())
    }
}
