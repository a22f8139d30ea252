//! Scroll-driven discovery over the results feed.
//!
//! The feed is virtualized and loads more entries as it is scrolled, with no
//! way to know its length up front. [`FeedScanController`] scrolls it step by
//! step, submitting newly visible references to the detail pipeline, until one
//! of the stop conditions holds or the feed stops advancing for longer than the
//! stuck threshold.

use crate::ads::AdsClassifier;
use crate::context::ScanContext;
use crate::dedup::LinkDeduplicator;
use crate::error::{Result, ScanError};
use crate::parser::{extract_possible_map_link, PlaceParser};
use crate::pipeline::DetailPipeline;
use mapscout_browser::Session;
use mapscout_core::{AppConfig, ListingRef, SearchQuery};
use std::time::Duration;
use tokio::time::Instant;

/// Path prefix of a search results surface.
pub const SEARCH_PATH: &str = "/maps/search/";

/// Path prefix of a single place surface.
pub const PLACE_PATH: &str = "/maps/place/";

/// Outcome of one discovery step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Keep scrolling
    Continue,
    /// Sponsored placements were submitted instead of organic results
    StopAdsOnly,
    /// The max-results cap was reached
    StopMaxReached,
    /// The end-of-results marker is visible
    StopEndOfFeed,
    /// The search redirected straight to one place
    SinglePlace,
    /// The search collapsed without a feed
    CollapsedSearch,
    /// No scroll progress within the stuck threshold
    Stuck,
}

impl ScanStep {
    /// Whether discovery ends at this step.
    pub fn is_terminal(self) -> bool {
        self != Self::Continue
    }
}

/// Scroll progress tracking for one discovery run.
#[derive(Debug, Clone)]
pub struct ScrollState {
    last_progress: Instant,
    /// Whether the most recent scroll advanced the feed
    pub did_scroll: bool,
    /// Scrolls performed in this run
    pub attempts: u32,
}

impl ScrollState {
    pub fn new() -> Self {
        Self {
            last_progress: Instant::now(),
            did_scroll: false,
            attempts: 0,
        }
    }

    /// Record a scroll; progress resets the elapsed counter.
    pub fn record(&mut self, did_scroll: bool) {
        self.attempts += 1;
        self.did_scroll = did_scroll;
        if did_scroll {
            self.last_progress = Instant::now();
        }
    }

    /// Time since the last scroll that advanced the feed.
    pub fn elapsed(&self) -> Duration {
        self.last_progress.elapsed()
    }

    pub fn is_stuck(&self, threshold: Duration) -> bool {
        self.elapsed() > threshold
    }
}

impl Default for ScrollState {
    fn default() -> Self {
        Self::new()
    }
}

/// Selectors and timings used by the discovery loop.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub feed_selector: String,
    pub link_selector: String,
    pub end_marker_selector: String,
    pub long_wait: Duration,
    pub short_wait: Duration,
    pub stuck_threshold: Duration,
    pub scroll_poll: Duration,
}

impl FeedSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            feed_selector: config.scanning.feed_selector.clone(),
            link_selector: config.scanning.link_selector.clone(),
            end_marker_selector: config.scanning.end_marker_selector.clone(),
            long_wait: config.browser.long_wait(),
            short_wait: config.browser.short_wait(),
            stuck_threshold: config.scanning.stuck_threshold(),
            scroll_poll: config.scanning.scroll_poll(),
        }
    }
}

/// Drives the scroll/discovery loop against one session.
pub struct FeedScanController<'a, S: Session + ?Sized> {
    session: &'a S,
    query: &'a SearchQuery,
    settings: &'a FeedSettings,
    parser: &'a dyn PlaceParser,
    context: &'a ScanContext,
    state: ScrollState,
}

impl<'a, S: Session + ?Sized> FeedScanController<'a, S> {
    pub fn new(
        session: &'a S,
        query: &'a SearchQuery,
        settings: &'a FeedSettings,
        parser: &'a dyn PlaceParser,
        context: &'a ScanContext,
    ) -> Self {
        Self {
            session,
            query,
            settings,
            parser,
            context,
            state: ScrollState::new(),
        }
    }

    /// Step until a terminal outcome.
    ///
    /// A stuck feed is reported as [`ScanError::StuckInFeed`]; stale element
    /// errors from the session are returned unchanged.
    pub async fn run(
        &mut self,
        dedup: &mut LinkDeduplicator,
        pipeline: &mut DetailPipeline,
    ) -> Result<ScanStep> {
        loop {
            let step = self.step(dedup, pipeline).await?;
            if step == ScanStep::Stuck {
                return Err(ScanError::StuckInFeed {
                    elapsed: self.state.elapsed(),
                });
            }
            if step.is_terminal() {
                return Ok(step);
            }
        }
    }

    /// Perform one discovery iteration.
    pub async fn step(
        &mut self,
        dedup: &mut LinkDeduplicator,
        pipeline: &mut DetailPipeline,
    ) -> Result<ScanStep> {
        let settings = self.settings;

        let has_feed = self
            .session
            .wait_for_element(&settings.feed_selector, settings.long_wait)
            .await?;
        if !has_feed {
            return self.classify_without_feed(dedup, pipeline).await;
        }

        if self.query.is_spending_on_ads {
            let sponsored = AdsClassifier::new(self.context)
                .sponsored_links(self.session)
                .await?;
            let accepted = dedup.accept(sponsored.iter().cloned());
            tracing::info!(
                scan_id = %self.context.scan_id(),
                count = accepted.len(),
                "submitting sponsored links only"
            );
            pipeline.submit(accepted);
            return Ok(ScanStep::StopAdsOnly);
        }

        let did_scroll = self.session.scroll_element(&settings.feed_selector).await?;
        self.state.record(did_scroll);

        let visible = self
            .session
            .links(&settings.link_selector, settings.long_wait)
            .await?;
        let accepted = dedup.accept(visible.into_iter().filter_map(|l| ListingRef::new(l).ok()));
        if !accepted.is_empty() {
            tracing::debug!(
                scan_id = %self.context.scan_id(),
                new = accepted.len(),
                total = dedup.accepted_count(),
                "discovered links"
            );
        }
        pipeline.submit(accepted);

        if dedup.is_full() {
            tracing::info!(scan_id = %self.context.scan_id(), "max results reached");
            return Ok(ScanStep::StopMaxReached);
        }

        let at_end = self
            .session
            .wait_for_element(&settings.end_marker_selector, settings.short_wait)
            .await?;
        if at_end {
            self.session.scroll_element(&settings.feed_selector).await?;
            tracing::info!(scan_id = %self.context.scan_id(), "reached end of feed");
            return Ok(ScanStep::StopEndOfFeed);
        }

        if self.state.is_stuck(settings.stuck_threshold) {
            tracing::warn!(
                scan_id = %self.context.scan_id(),
                elapsed = ?self.state.elapsed(),
                "feed stopped advancing"
            );
            return Ok(ScanStep::Stuck);
        }

        if !did_scroll {
            tokio::time::sleep(settings.scroll_poll).await;
        }

        Ok(ScanStep::Continue)
    }

    async fn classify_without_feed(
        &self,
        dedup: &mut LinkDeduplicator,
        pipeline: &mut DetailPipeline,
    ) -> Result<ScanStep> {
        if self.session.is_in_page(SEARCH_PATH).await? {
            let html = self.session.page_source().await?;
            if let Some(link) = extract_possible_map_link(self.parser, &html) {
                tracing::info!(
                    scan_id = %self.context.scan_id(),
                    %link,
                    "search collapsed to one place"
                );
                pipeline.submit(dedup.accept([link]));
            } else {
                tracing::info!(scan_id = %self.context.scan_id(), "search returned no feed");
            }
            return Ok(ScanStep::CollapsedSearch);
        }

        if self.session.is_in_page(PLACE_PATH).await? {
            let current = self.session.current_url().await?;
            let link = ListingRef::new(current)?;
            tracing::info!(
                scan_id = %self.context.scan_id(),
                %link,
                "search redirected to a place"
            );
            pipeline.submit(dedup.accept([link]));
            return Ok(ScanStep::SinglePlace);
        }

        tracing::warn!(scan_id = %self.context.scan_id(), "no feed and not on a map surface");
        Ok(ScanStep::CollapsedSearch)
    }
}
