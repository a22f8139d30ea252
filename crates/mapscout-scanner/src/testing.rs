//! Scripted collaborators for exercising the scanner without a browser or network.
//!
//! Enabled for unit tests and, through the `test-support` feature, for the
//! integration tests under `tests/`.

use crate::error::{Result, ScanError};
use crate::fetch::PlaceFetcher;
use crate::parser::{INIT_STATE_END, INIT_STATE_START};
use mapscout_browser::{BrowserError, Session};
use mapscout_core::{AppConfig, ListingRef, ScanningConfig};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const PLACE_BASE: &str = "https://www.google.com/maps/place/";

/// URL of a place reference named `name`.
pub fn place_url(name: &str) -> String {
    format!("{PLACE_BASE}{name}")
}

/// Place reference named `name`.
///
/// # Panics
///
/// Never for names without whitespace.
pub fn place_link(name: &str) -> ListingRef {
    ListingRef::new(place_url(name)).expect("place url is valid")
}

/// Configuration with cooldowns removed and short stuck detection.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.browser.long_wait_ms = 10;
    config.browser.short_wait_ms = 10;
    config.scanning.stuck_threshold_ms = 50;
    config.scanning.scroll_poll_ms = 5;
    config.scanning.stuck_cooldown_ms = 0;
    config.detail.retry_cooldown_ms = 0;
    config
}

/// A place page body carrying a well-formed initialization payload.
pub fn place_page_html(name: &str, link: &str) -> String {
    let mut info = vec![Value::Null; 179];
    info[2] = json!(["Rua Augusta 1", "1100-048 Lisboa"]);
    info[4] = json!([null, null, null, null, null, null, null, 4.6, 1280]);
    info[7] = json!(["https://cafe.example", "cafe.example"]);
    info[9] = json!([null, null, 38.7101, -9.1366]);
    info[11] = json!(name);
    info[13] = json!(["Coffee shop", "Bakery"]);
    info[39] = json!("Rua Augusta 1, 1100-048 Lisboa");
    info[78] = json!(format!("ChIJ{}", name.len()));
    info[178] = json!([["+351 21 000 0000", [["+351210000000", 1]]]]);

    let inner = json!([null, null, null, null, null, null, info]);
    let nested = format!(")]}}'\n{inner}");
    let outer = json!([null, null, null, [null, null, null, null, null, null, nested]]);

    format!(
        r#"<html><head><meta property="og:url" content="{link}"></head><body><script>var x=1{INIT_STATE_START}{outer}{INIT_STATE_END}=[];</script></body></html>"#
    )
}

/// A collapsed search page whose payload points at a single place.
pub fn collapsed_search_html(link: &str) -> String {
    format!(
        r#"<html><body><script>{INIT_STATE_START}[null,[[null,"{link}"]]]{INIT_STATE_END}=[];</script></body></html>"#
    )
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`PlaceFetcher`] serving generated place pages, with scripted failures.
///
/// Pages are keyed by the last path segment of the requested URL.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    failures: HashMap<String, usize>,
    malformed: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
    last_cookies: Mutex<HashMap<String, String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request for `name` fails.
    #[must_use]
    pub fn failing(self, name: &str) -> Self {
        self.failing_times(name, usize::MAX)
    }

    /// The first `times` requests for `name` fail.
    #[must_use]
    pub fn failing_times(mut self, name: &str, times: usize) -> Self {
        self.failures.insert(name.to_string(), times);
        self
    }

    /// Requests for `name` return a page without an initialization payload.
    #[must_use]
    pub fn malformed(mut self, name: &str) -> Self {
        self.malformed.insert(name.to_string());
        self
    }

    /// Number of requests made for `link`.
    pub fn calls(&self, link: &ListingRef) -> usize {
        lock(&self.calls).get(link.as_str()).copied().unwrap_or(0)
    }

    /// Total requests across all links.
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Cookies sent with the most recent request.
    pub fn last_cookies(&self) -> HashMap<String, String> {
        lock(&self.last_cookies).clone()
    }
}

#[async_trait::async_trait]
impl PlaceFetcher for StaticFetcher {
    async fn get(&self, url: &str, cookies: &HashMap<String, String>) -> Result<String> {
        let call = {
            let mut calls = lock(&self.calls);
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        *lock(&self.last_cookies) = cookies.clone();

        let name = url.rsplit('/').next().unwrap_or_default();
        if self.failures.get(name).is_some_and(|&times| call <= times) {
            return Err(ScanError::DetailFetch {
                url: url.to_string(),
                reason: "HTTP 429 Too Many Requests".to_string(),
            });
        }
        if self.malformed.contains(name) {
            return Ok("<html><body>consent required</body></html>".to_string());
        }

        Ok(place_page_html(name, url))
    }
}

/// One window of the virtualized feed, revealed by a scroll.
#[derive(Debug, Clone, Default)]
pub struct FeedFrame {
    links: Vec<String>,
    end_marker: bool,
}

impl FeedFrame {
    /// A window showing the places named in `names`.
    pub fn new(names: &[&str]) -> Self {
        Self {
            links: names.iter().map(|n| place_url(n)).collect(),
            end_marker: false,
        }
    }

    /// Show the end-of-results marker with this window.
    #[must_use]
    pub fn with_end_marker(mut self) -> Self {
        self.end_marker = true;
        self
    }
}

#[derive(Debug, Default)]
struct SessionState {
    url: String,
    revealed: usize,
    navigations: Vec<String>,
    script_calls: usize,
    scroll_calls: usize,
    stale_remaining: usize,
    stale_scripts_remaining: usize,
}

/// [`Session`] replaying a fixed feed.
///
/// Each scroll reveals the next [`FeedFrame`] and reports progress; once the
/// last frame is showing, scrolls stop advancing. Navigation rewinds the feed.
#[derive(Debug)]
pub struct ScriptedSession {
    feed_selector: String,
    link_selector: String,
    end_marker_selector: String,
    frames: Vec<FeedFrame>,
    has_feed: bool,
    redirect_url: Option<String>,
    page_source: String,
    sponsored: Value,
    end_marker_hidden_for: usize,
    state: Mutex<SessionState>,
}

impl ScriptedSession {
    pub fn new(scanning: &ScanningConfig) -> Self {
        Self {
            feed_selector: scanning.feed_selector.clone(),
            link_selector: scanning.link_selector.clone(),
            end_marker_selector: scanning.end_marker_selector.clone(),
            frames: Vec::new(),
            has_feed: true,
            redirect_url: None,
            page_source: String::from("<html></html>"),
            sponsored: json!([]),
            end_marker_hidden_for: 0,
            state: Mutex::new(SessionState::default()),
        }
    }

    #[must_use]
    pub fn with_frames(mut self, frames: Vec<FeedFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Links the sponsored-link script reports.
    #[must_use]
    pub fn with_sponsored<L: AsRef<str>>(mut self, links: &[L]) -> Self {
        self.sponsored = json!(links.iter().map(AsRef::as_ref).collect::<Vec<&str>>());
        self
    }

    /// Raw value the sponsored-link script returns.
    #[must_use]
    pub fn with_sponsored_value(mut self, value: Value) -> Self {
        self.sponsored = value;
        self
    }

    /// Render no feed; navigation lands on `url` instead.
    #[must_use]
    pub fn without_feed(mut self, url: &str) -> Self {
        self.has_feed = false;
        self.redirect_url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn with_page_source(mut self, html: impl Into<String>) -> Self {
        self.page_source = html.into();
        self
    }

    /// The first `count` link reads fail with a stale element error.
    #[must_use]
    pub fn with_stale_reads(self, count: usize) -> Self {
        lock(&self.state).stale_remaining = count;
        self
    }

    /// The first `count` script evaluations fail with a stale context error.
    #[must_use]
    pub fn with_stale_scripts(self, count: usize) -> Self {
        lock(&self.state).stale_scripts_remaining = count;
        self
    }

    /// Keep the end marker hidden during the first `navigations` page loads.
    #[must_use]
    pub fn with_end_marker_hidden_for(mut self, navigations: usize) -> Self {
        self.end_marker_hidden_for = navigations;
        self
    }

    pub fn script_calls(&self) -> usize {
        lock(&self.state).script_calls
    }

    pub fn scroll_calls(&self) -> usize {
        lock(&self.state).scroll_calls
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.state).navigations.clone()
    }

    fn current_frame<'a>(&'a self, state: &SessionState) -> Option<&'a FeedFrame> {
        state
            .revealed
            .checked_sub(1)
            .and_then(|index| self.frames.get(index))
    }
}

#[async_trait::async_trait]
impl Session for ScriptedSession {
    async fn navigate(&self, url: &str) -> mapscout_browser::Result<()> {
        let mut state = lock(&self.state);
        state.navigations.push(url.to_string());
        state.revealed = 0;
        state.url = self.redirect_url.clone().unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> mapscout_browser::Result<String> {
        Ok(lock(&self.state).url.clone())
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> mapscout_browser::Result<bool> {
        let state = lock(&self.state);
        if selector == self.feed_selector {
            return Ok(self.has_feed);
        }
        if selector == self.end_marker_selector {
            let hidden = self.end_marker_hidden_for > 0
                && state.navigations.len() <= self.end_marker_hidden_for;
            return Ok(!hidden && self.current_frame(&state).is_some_and(|f| f.end_marker));
        }
        Ok(false)
    }

    async fn scroll_element(&self, selector: &str) -> mapscout_browser::Result<bool> {
        let mut state = lock(&self.state);
        state.scroll_calls += 1;
        if selector != self.feed_selector || !self.has_feed {
            return Err(BrowserError::SelectorNotFound(selector.to_string()));
        }
        if state.revealed < self.frames.len() {
            state.revealed += 1;
            return Ok(true);
        }
        Ok(false)
    }

    async fn links(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> mapscout_browser::Result<Vec<String>> {
        let mut state = lock(&self.state);
        if state.stale_remaining > 0 {
            state.stale_remaining -= 1;
            return Err(BrowserError::StaleElement(format!(
                "node matched by {selector} was detached"
            )));
        }
        if selector != self.link_selector {
            return Ok(Vec::new());
        }
        Ok(self
            .current_frame(&state)
            .map(|frame| frame.links.clone())
            .unwrap_or_default())
    }

    async fn execute_script(&self, _script: &str) -> mapscout_browser::Result<Value> {
        let mut state = lock(&self.state);
        state.script_calls += 1;
        if state.stale_scripts_remaining > 0 {
            state.stale_scripts_remaining -= 1;
            return Err(BrowserError::StaleElement(
                "Cannot find context with specified id".to_string(),
            ));
        }
        Ok(self.sponsored.clone())
    }

    async fn cookies(&self) -> mapscout_browser::Result<HashMap<String, String>> {
        Ok([("NID".to_string(), "scripted".to_string())]
            .into_iter()
            .collect())
    }

    async fn page_source(&self) -> mapscout_browser::Result<String> {
        Ok(self.page_source.clone())
    }
}
