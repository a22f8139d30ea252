use crate::error::{BrowserError, Result};
use crate::session::Session;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::Page;
use futures::stream::StreamExt;
use mapscout_core::BrowserConfig;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Interval between element lookups while waiting for a selector.
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

const SCROLL_SCRIPT: &str = r"(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) return null;
    const before = el.scrollTop;
    el.scrollBy(0, el.scrollHeight);
    return el.scrollTop !== before;
})()";

const LINKS_SCRIPT: &str = r"(() => Array.from(document.querySelectorAll(__SELECTOR__))
    .map((a) => a.href)
    .filter((href) => typeof href === 'string' && href.length > 0))()";

/// Headless Chromium tab implementing [`Session`].
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    /// Launch Chromium and open a blank tab.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut builder = ChromiumConfig::builder()
            .no_sandbox()
            .window_size(config.window_width, config.window_height)
            .arg("--blink-settings=imagesEnabled=false");

        if !config.headless {
            builder = builder.with_head();
        }

        let chromium_config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("chromium handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        tracing::info!(headless = config.headless, "launched chromium session");

        Ok(Self {
            browser,
            page,
            handler,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        })
    }

    /// Close the browser and stop its event handler.
    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        self.handler.abort();
        Ok(())
    }

    fn selector_script(template: &str, selector: &str) -> Result<String> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| BrowserError::ScriptError(format!("cannot quote selector: {e}")))?;
        Ok(template.replace("__SELECTOR__", &quoted))
    }

    async fn evaluate(&self, script: String) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::from_cdp_message(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait::async_trait]
impl Session for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        tracing::debug!(url, "navigating");
        tokio::time::timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout(format!("navigation to {url}")))?
            .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::from_cdp_message(e.to_string()))?
            .ok_or_else(|| BrowserError::NavigationError("page has no URL".to_string()))
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn scroll_element(&self, selector: &str) -> Result<bool> {
        let script = Self::selector_script(SCROLL_SCRIPT, selector)?;
        match self.evaluate(script).await? {
            serde_json::Value::Bool(advanced) => Ok(advanced),
            // The element vanished between lookup and scroll.
            _ => Err(BrowserError::StaleElement(selector.to_string())),
        }
    }

    async fn links(&self, selector: &str, timeout: Duration) -> Result<Vec<String>> {
        if !self.wait_for_element(selector, timeout).await? {
            return Ok(Vec::new());
        }

        let script = Self::selector_script(LINKS_SCRIPT, selector)?;
        let value = self.evaluate(script).await?;
        serde_json::from_value(value)
            .map_err(|e| BrowserError::ScriptError(format!("unexpected links result: {e}")))
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value> {
        self.evaluate(script.to_string()).await
    }

    async fn cookies(&self) -> Result<HashMap<String, String>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn page_source(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }
}
