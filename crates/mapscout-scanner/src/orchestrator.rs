//! Scan orchestrator tying discovery, detail extraction and assembly together.
//!
//! This module provides the `ScanOrchestrator` which runs one search query
//! end to end: it navigates the session to the search surface, drives feed
//! discovery under the retry policy while detail workers fetch places in the
//! background, then assembles the result and its cacheability verdict.

use crate::ads::AdsClassifier;
use crate::assembler::{ResultAssembler, ScanOutcome};
use crate::cache::{DetailCache, ResultCache};
use crate::context::ScanContext;
use crate::dedup::LinkDeduplicator;
use crate::error::Result;
use crate::feed::{FeedScanController, FeedSettings, ScanStep};
use crate::fetch::PlaceFetcher;
use crate::parser::PlaceParser;
use crate::pipeline::{DetailPipeline, DetailWorker};
use crate::retry::{Discovery, RetryEscalator, RetryPolicy};
use crate::search_url::build_search_url;
use mapscout_browser::Session;
use mapscout_core::{AppConfig, ListingRef, Place, SearchQuery};
use std::sync::Arc;

/// Runs map-search scans against one browser session.
pub struct ScanOrchestrator {
    /// Session driven by the discovery loop
    session: Arc<dyn Session>,
    /// Fetcher shared by detail workers
    fetcher: Arc<dyn PlaceFetcher>,
    /// Parser for place payloads and collapsed searches
    parser: Arc<dyn PlaceParser>,
    /// Optional per-place cache
    detail_cache: Option<Arc<dyn DetailCache>>,
    config: AppConfig,
    /// Maximum concurrent detail fetches
    max_concurrent_fetches: usize,
}

impl ScanOrchestrator {
    /// Create a new scan orchestrator.
    #[must_use]
    pub fn new(
        session: Arc<dyn Session>,
        fetcher: Arc<dyn PlaceFetcher>,
        parser: Arc<dyn PlaceParser>,
        config: AppConfig,
    ) -> Self {
        Self {
            session,
            fetcher,
            parser,
            detail_cache: None,
            max_concurrent_fetches: config.detail.concurrency,
            config,
        }
    }

    /// Serve and store place details through `cache`.
    #[must_use]
    pub fn with_detail_cache(mut self, cache: Arc<dyn DetailCache>) -> Self {
        self.detail_cache = Some(cache);
        self
    }

    /// Set the maximum number of concurrent detail fetches.
    #[must_use]
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    fn detail_worker(&self) -> Arc<DetailWorker> {
        Arc::new(
            DetailWorker::new(
                Arc::clone(&self.fetcher),
                Arc::clone(&self.parser),
                &self.config.detail,
            )
            .with_cache(self.detail_cache.clone()),
        )
    }

    /// Scan one search query.
    ///
    /// Degraded scans (failed references, a feed that never finished
    /// scrolling) still return `Ok`; check [`ScanOutcome::cacheable`].
    pub async fn scan(&self, query: &SearchQuery) -> Result<ScanOutcome> {
        let search_url = build_search_url(query, &self.config.general)?;
        let context = Arc::new(ScanContext::new());
        let settings = FeedSettings::from_config(&self.config);

        tracing::info!(
            scan_id = %context.scan_id(),
            query = %query.query,
            url = %search_url,
            "Starting scan"
        );

        let mut discovery = FeedDiscovery {
            session: self.session.as_ref(),
            parser: self.parser.as_ref(),
            search_url: &search_url,
            query,
            settings: &settings,
            context: &context,
            dedup: LinkDeduplicator::new(query.max_results),
            pipeline: DetailPipeline::start(
                self.detail_worker(),
                Arc::clone(&context),
                self.max_concurrent_fetches,
            ),
        };

        let report = RetryEscalator::new(RetryPolicy::from_config(&self.config.scanning))
            .run(&mut discovery)
            .await?;

        let FeedDiscovery { pipeline, dedup, .. } = discovery;
        tracing::debug!(
            scan_id = %context.scan_id(),
            final_step = ?report.final_step,
            attempts = report.attempts,
            submitted = dedup.accepted_count(),
            "discovery finished, waiting for details"
        );

        let records = pipeline.collect().await;
        let sponsored = self.resolve_sponsored(&context).await?;

        let mut outcome = ResultAssembler::new(query.convert_to_english).assemble(
            &query.query,
            records,
            sponsored.unwrap_or_default(),
            report.failed_to_scroll,
        );
        if sponsored.is_none() {
            // Sponsored tagging is unknown, so the result must not be memoized.
            outcome.cacheable = false;
        }

        tracing::info!(
            scan_id = %context.scan_id(),
            places = outcome.result.places.len(),
            had_failures = outcome.result.had_failures,
            failed_to_scroll = outcome.result.failed_to_scroll,
            cacheable = outcome.cacheable,
            "Scan completed"
        );

        Ok(outcome)
    }

    /// Resolve the sponsored set, retrying stale reads.
    ///
    /// Returns `None` when the page stayed stale through every retry.
    async fn resolve_sponsored<'c>(
        &self,
        context: &'c ScanContext,
    ) -> Result<Option<&'c [ListingRef]>> {
        let ads = AdsClassifier::new(context);
        let mut retries = 0;
        loop {
            match ads.sponsored_links(self.session.as_ref()).await {
                Ok(links) => return Ok(Some(links)),
                Err(e) if e.is_stale() && retries < self.config.scanning.stale_retries => {
                    retries += 1;
                    tracing::warn!(
                        scan_id = %context.scan_id(),
                        retries,
                        "Sponsored link lookup went stale: {}. Retrying...",
                        e
                    );
                }
                Err(e) if e.is_stale() => {
                    tracing::error!(
                        scan_id = %context.scan_id(),
                        "Sponsored links unavailable after {} retries: {}",
                        retries,
                        e
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Scan through a result cache.
    ///
    /// A cached result is served as-is; a fresh one is stored only when cacheable.
    pub async fn scan_with_cache(
        &self,
        query: &SearchQuery,
        cache: &dyn ResultCache,
    ) -> Result<ScanOutcome> {
        let key = query.cache_key();
        if let Some(result) = cache.get(&key) {
            tracing::debug!(query = %query.query, "serving cached scan result");
            return Ok(ScanOutcome {
                result,
                cacheable: true,
            });
        }

        let outcome = self.scan(query).await?;
        if outcome.cacheable {
            cache.put(&key, outcome.result.clone());
        } else {
            tracing::info!(query = %query.query, "Result incomplete, not caching");
        }

        Ok(outcome)
    }

    /// Extract details for already known references, skipping discovery.
    pub async fn scan_links(
        &self,
        links: Vec<ListingRef>,
        convert_to_english: bool,
    ) -> Result<ScanOutcome> {
        let context = Arc::new(ScanContext::new());
        tracing::info!(scan_id = %context.scan_id(), links = links.len(), "Fetching known links");

        self.session.navigate(&self.config.general.base_url).await?;
        context.set_cookies(self.session.cookies().await?);

        let mut dedup = LinkDeduplicator::new(None);
        let mut pipeline = DetailPipeline::start(
            self.detail_worker(),
            Arc::clone(&context),
            self.max_concurrent_fetches,
        );
        pipeline.submit(dedup.accept(links));
        let records = pipeline.collect().await;

        Ok(ResultAssembler::new(convert_to_english).assemble("", records, &[], false))
    }

    /// Extract one place with the session's current cookies.
    ///
    /// Returns `None` when every attempt failed.
    pub async fn fetch_detail(&self, link: &ListingRef) -> Result<Option<Place>> {
        let cookies = self.session.cookies().await?;
        Ok(self
            .detail_worker()
            .fetch_detail(link, &cookies)
            .await
            .into_place())
    }
}

/// Feed discovery for one scan, restartable by the retry escalator.
///
/// The deduplicator and pipeline outlive individual attempts so a reference
/// found before a retry is never fetched twice.
struct FeedDiscovery<'a> {
    session: &'a dyn Session,
    parser: &'a dyn PlaceParser,
    search_url: &'a str,
    query: &'a SearchQuery,
    settings: &'a FeedSettings,
    context: &'a ScanContext,
    dedup: LinkDeduplicator,
    pipeline: DetailPipeline,
}

#[async_trait::async_trait]
impl<'a> Discovery for FeedDiscovery<'a> {
    async fn begin_attempt(&mut self, attempt: u32) -> Result<()> {
        tracing::debug!(scan_id = %self.context.scan_id(), attempt, "navigating to search");
        self.session.navigate(self.search_url).await?;
        self.context.set_cookies(self.session.cookies().await?);
        Ok(())
    }

    async fn discover(&mut self) -> Result<ScanStep> {
        FeedScanController::new(
            self.session,
            self.query,
            self.settings,
            self.parser,
            self.context,
        )
        .run(&mut self.dedup, &mut self.pipeline)
        .await
    }
}
