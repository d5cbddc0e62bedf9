//! Static renderer: one GET per navigation, text derived from the parsed markup.
//! Only plain links can be "clicked" (activation follows the href), so tabs or
//! pagers driven by scripts are reported as absent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{StatusCode, Url};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{Handle, MatchStrategy, RenderError, Renderer, RendererFactory, Result};
use crate::settings::RendererSettings;

/// Subtrees that never contribute visible text.
const HIDDEN: &[&str] = &["head", "script", "style", "noscript", "template", "svg", "iframe"];

/// Elements rendered on their own line.
const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "td",
    "th", "tr", "ul",
];

pub struct HttpFactory {
    cfg: RendererSettings,
}

impl HttpFactory {
    pub fn new(cfg: RendererSettings) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl RendererFactory for HttpFactory {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        if self.cfg.stealth {
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.cfg.request_timeout_ms))
            .default_headers(headers);
        if self.cfg.stealth {
            builder = builder.user_agent(self.cfg.user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RenderError::RendererInitFailed(e.to_string()))?;

        Ok(Box::new(HttpRenderer {
            client,
            url: String::new(),
            markup: String::new(),
        }))
    }
}

pub struct HttpRenderer {
    client: reqwest::Client,
    url: String,
    markup: String,
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let resp = self.client.get(url).send().await.map_err(map_reqwest)?;
        let status = resp.status();
        self.url = resp.url().to_string();

        // Denial pages are kept so the session can recognize them from their text.
        let keep_body = status.is_success()
            || matches!(
                status,
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
            );
        if !keep_body {
            return Err(RenderError::Navigation(format!("HTTP {} for {}", status, url)));
        }

        self.markup = resp.text().await.map_err(map_reqwest)?;
        debug!(url = %self.url, status = status.as_u16(), bytes = self.markup.len(), "fetched page");
        Ok(())
    }

    async fn current_text(&mut self) -> Result<String> {
        Ok(visible_text(&self.markup))
    }

    async fn current_markup(&mut self) -> Result<String> {
        Ok(self.markup.clone())
    }

    async fn find_first_visible_enabled(
        &mut self,
        strategies: &[MatchStrategy],
    ) -> Result<Option<Handle>> {
        let Ok(base) = Url::parse(&self.url) else {
            return Ok(None);
        };
        let doc = Html::parse_document(&self.markup);
        Ok(strategies
            .iter()
            .find_map(|s| find_link(&doc, s, &base))
            .map(|url| Handle(url.to_string())))
    }

    async fn activate(&mut self, handle: &Handle) -> Result<()> {
        let target = Url::parse(&handle.0)
            .map_err(|_| RenderError::ElementNotFound(handle.0.clone()))?;
        self.navigate(target.as_str())
            .await
            .map_err(|e| RenderError::ActivationFailed(format!("{}: {}", handle.0, e)))
    }

    async fn title(&mut self) -> Result<String> {
        let doc = Html::parse_document(&self.markup);
        let Ok(sel) = Selector::parse("title") else {
            return Ok(String::new());
        };
        Ok(doc
            .select(&sel)
            .next()
            .map(|t| collapse(&t.text().collect::<String>()))
            .unwrap_or_default())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn close(&mut self) -> Result<()> {
        self.markup.clear();
        Ok(())
    }
}

fn map_reqwest(e: reqwest::Error) -> RenderError {
    if e.is_timeout() {
        RenderError::LoadTimeout
    } else {
        RenderError::Navigation(e.to_string())
    }
}

/// One line per block element, hidden subtrees dropped. Entities are decoded
/// by the HTML parser; inline elements stay on their line.
pub fn visible_text(markup: &str) -> String {
    let doc = Html::parse_document(markup);
    let mut out = String::new();
    push_text(doc.root_element(), &mut out);

    out.lines()
        .map(collapse)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_text(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    if HIDDEN.contains(&name) || is_hidden(el) {
        return;
    }
    let block = BLOCKS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_text(child_el, out);
                }
            }
            _ => {}
        }
    }
    if block {
        out.push('\n');
    }
}

fn is_hidden(el: ElementRef<'_>) -> bool {
    let v = el.value();
    v.attr("hidden").is_some()
        || v.attr("aria-hidden") == Some("true")
        || v.attr("style").is_some_and(|s| {
            s.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .contains("display:none")
        })
}

fn is_disabled(el: ElementRef<'_>) -> bool {
    let v = el.value();
    v.attr("disabled").is_some() || v.attr("aria-disabled") == Some("true")
}

/// First followable link matching `strategy`, resolved against `base`.
fn find_link(doc: &Html, strategy: &MatchStrategy, base: &Url) -> Option<Url> {
    let links = Selector::parse("a[href]").ok()?;
    let scopes: Vec<ElementRef<'_>> = match strategy.region() {
        Some(region) => {
            let Ok(sel) = Selector::parse(region) else {
                debug!("unusable region selector {:?}", region);
                return None;
            };
            doc.select(&sel).collect()
        }
        None => vec![doc.root_element()],
    };

    scopes
        .into_iter()
        .flat_map(|scope| scope.select(&links))
        .filter(|a| !is_disabled(*a) && !is_hidden(*a))
        .filter(|a| !a.ancestors().filter_map(ElementRef::wrap).any(is_hidden))
        .filter(|a| strategy.matches_text(&collapse(&a.text().collect::<String>())))
        .find_map(|a| {
            let href = a.value().attr("href")?.trim();
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                return None;
            }
            base.join(href).ok()
        })
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
