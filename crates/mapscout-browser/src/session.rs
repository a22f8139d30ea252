use crate::error::{BrowserError, Result};
use std::collections::HashMap;
use std::time::Duration;

/// A single browser tab driven sequentially by the discovery loop.
///
/// Implementations must report detached elements as
/// [`BrowserError::StaleElement`] so callers can retry them.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current URL of the tab
    async fn current_url(&self) -> Result<String>;

    /// Wait up to `timeout` for a selector; `false` if it never appeared
    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Scroll an element to its bottom; `true` if the scroll position moved
    async fn scroll_element(&self, selector: &str) -> Result<bool>;

    /// `href` values of all anchors matching a selector, waiting up to `timeout`
    async fn links(&self, selector: &str, timeout: Duration) -> Result<Vec<String>>;

    /// Evaluate a page-side script and return its JSON result
    async fn execute_script(&self, script: &str) -> Result<serde_json::Value>;

    /// Cookies of the current page as name/value pairs
    async fn cookies(&self) -> Result<HashMap<String, String>>;

    /// Raw HTML of the current document
    async fn page_source(&self) -> Result<String>;

    /// Whether the current URL path starts with `path_prefix`
    async fn is_in_page(&self, path_prefix: &str) -> Result<bool> {
        let current = self.current_url().await?;
        Ok(extract_path(&current)
            .map(|path| path.starts_with(path_prefix))
            .unwrap_or(false))
    }
}

/// Helper to extract the path from a URL
pub fn extract_path(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;

    Ok(url.path().to_string())
}
