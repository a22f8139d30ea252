//! HTTP fetching of place pages.

use crate::error::{Result, ScanError};
use mapscout_core::DetailConfig;
use std::collections::HashMap;
use std::time::Duration;

/// Fetches the raw body of a place page.
#[async_trait::async_trait]
pub trait PlaceFetcher: Send + Sync {
    /// GET `url`, sending `cookies` with the request.
    async fn get(&self, url: &str, cookies: &HashMap<String, String>) -> Result<String>;
}

/// [`PlaceFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpPlaceFetcher {
    client: reqwest::Client,
}

impl HttpPlaceFetcher {
    /// Build a fetcher from detail settings.
    pub fn new(config: &DetailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

/// Render cookies as a `Cookie` header value, sorted by name.
pub fn cookie_header(cookies: &HashMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }

    let mut pairs: Vec<_> = cookies.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    Some(
        pairs
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[async_trait::async_trait]
impl PlaceFetcher for HttpPlaceFetcher {
    async fn get(&self, url: &str, cookies: &HashMap<String, String>) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(header) = cookie_header(cookies) {
            request = request.header(reqwest::header::COOKIE, header);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::DetailFetch {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }
        Ok(response.text().await?)
    }
}
