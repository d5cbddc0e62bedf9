//! Headless Chromium via the DevTools protocol. Element search runs in-page so
//! every strategy sees the same visibility and enabled rules.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Handle, MatchStrategy, RenderError, Renderer, RendererFactory, Result};
use crate::settings::RendererSettings;

const HANDLE_ATTR: &str = "data-tour-handle";

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

const FIND_SCRIPT: &str = r#"
(function (strategies, attr, id) {
  const CLICKABLE = 'button, a, [role=button], [role=tab], [role=link], li, span, div';
  const ownText = (el) => {
    const direct = Array.from(el.childNodes)
      .filter((n) => n.nodeType === Node.TEXT_NODE)
      .map((n) => n.textContent)
      .join(' ')
      .trim();
    return direct || (el.children.length === 0 ? (el.innerText || '').trim() : '');
  };
  const usable = (el) => {
    if (el.disabled || el.getAttribute('aria-disabled') === 'true') return false;
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    return el.getClientRects().length > 0;
  };
  const matches = (s, text) => {
    if (s.kind === 'exact') return text === s.text;
    return text.toLowerCase().includes(s.text.toLowerCase());
  };
  for (const s of strategies) {
    let pool;
    if (s.kind === 'scoped') {
      pool = Array.from(document.querySelectorAll(s.region))
        .flatMap((r) => Array.from(r.querySelectorAll(CLICKABLE)));
    } else {
      pool = Array.from(document.querySelectorAll(CLICKABLE));
    }
    const hit = pool.find((el) => matches(s, ownText(el)) && usable(el));
    if (hit) {
      hit.setAttribute(attr, id);
      return id;
    }
  }
  return null;
})
"#;

pub struct ChromeFactory {
    cfg: RendererSettings,
}

impl ChromeFactory {
    pub fn new(cfg: RendererSettings) -> Self {
        Self { cfg }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(self.cfg.window_width, self.cfg.window_height)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if self.cfg.stealth {
            builder = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-infobars")
                .arg(format!("--user-agent={}", self.cfg.user_agent));
        }
        builder.build().map_err(RenderError::RendererInitFailed)
    }
}

#[async_trait]
impl RendererFactory for ChromeFactory {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::RendererInitFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("chromiumoxide handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(RenderError::RendererInitFailed(e.to_string()));
            }
        };
        if self.cfg.stealth {
            if let Err(e) = page.set_user_agent(self.cfg.user_agent.as_str()).await {
                warn!("could not set user agent: {}", e);
            }
        }

        Ok(Box::new(ChromeRenderer {
            browser,
            page,
            handler_task,
            closed: false,
        }))
    }
}

pub struct ChromeRenderer {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: bool,
}

impl ChromeRenderer {
    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> Result<T> {
        let value = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        value
            .into_value::<T>()
            .map_err(|e| RenderError::Navigation(format!("unexpected script result: {}", e)))
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn current_text(&mut self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn current_markup(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))
    }

    async fn find_first_visible_enabled(
        &mut self,
        strategies: &[MatchStrategy],
    ) -> Result<Option<Handle>> {
        let json = serde_json::to_string(strategies)
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed).to_string();
        let js = format!("{}({}, {:?}, {:?})", FIND_SCRIPT.trim(), json, HANDLE_ATTR, id);

        let found: Option<String> = self.eval(js).await?;
        Ok(found.map(Handle))
    }

    async fn activate(&mut self, handle: &Handle) -> Result<()> {
        let selector = format!("[{}=\"{}\"]", HANDLE_ATTR, handle.0);
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| RenderError::ElementNotFound(handle.0.clone()))?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| RenderError::ActivationFailed(e.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| RenderError::ActivationFailed(e.to_string()))?;
        Ok(())
    }

    async fn title(&mut self) -> Result<String> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}
