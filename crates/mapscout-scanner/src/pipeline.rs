//! Concurrent detail extraction.
//!
//! References submitted to a [`DetailPipeline`] are pulled from a shared queue
//! by a fixed pool of workers. Each worker fetches the place page, slices out
//! the initialization payload and parses it, retrying with a cooldown. A
//! reference that fails every attempt yields [`ListingRecord::Failed`] instead
//! of aborting its siblings.

use crate::cache::DetailCache;
use crate::context::ScanContext;
use crate::error::Result;
use crate::fetch::PlaceFetcher;
use crate::parser::{extract_initialization_state, PlaceParser};
use mapscout_core::{DetailConfig, LinkBatch, ListingRecord, ListingRef, Place};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// Fetch, parse and retry logic for a single reference.
pub struct DetailWorker {
    fetcher: Arc<dyn PlaceFetcher>,
    parser: Arc<dyn PlaceParser>,
    cache: Option<Arc<dyn DetailCache>>,
    max_attempts: u32,
    retry_cooldown: Duration,
}

impl DetailWorker {
    pub fn new(
        fetcher: Arc<dyn PlaceFetcher>,
        parser: Arc<dyn PlaceParser>,
        config: &DetailConfig,
    ) -> Self {
        Self {
            fetcher,
            parser,
            cache: None,
            max_attempts: config.max_attempts.max(1),
            retry_cooldown: config.retry_cooldown(),
        }
    }

    /// Serve and store successful results through `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Option<Arc<dyn DetailCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Extract one reference, retrying up to the configured attempts.
    pub async fn fetch_detail(
        &self,
        link: &ListingRef,
        cookies: &HashMap<String, String>,
    ) -> ListingRecord {
        if let Some(place) = self.cache.as_ref().and_then(|c| c.get(link.as_str())) {
            tracing::debug!(%link, "detail cache hit");
            return ListingRecord::Complete(place);
        }

        for attempt in 1..=self.max_attempts {
            match self.extract_once(link, cookies).await {
                Ok(place) => {
                    if let Some(cache) = &self.cache {
                        cache.put(link.as_str(), place.clone());
                    }
                    return ListingRecord::Complete(place);
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        %link,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Failed to scrape place: {}. Retrying in {:?}...",
                        e,
                        self.retry_cooldown
                    );
                    tokio::time::sleep(self.retry_cooldown).await;
                }
                Err(e) => {
                    tracing::error!(
                        %link,
                        attempts = self.max_attempts,
                        "Giving up on place: {}",
                        e
                    );
                }
            }
        }

        ListingRecord::Failed(link.clone())
    }

    async fn extract_once(
        &self,
        link: &ListingRef,
        cookies: &HashMap<String, String>,
    ) -> Result<Place> {
        let html = self.fetcher.get(link.as_str(), cookies).await?;
        let payload = extract_initialization_state(&html, link.as_str())?;
        let mut place = self.parser.parse_place(payload, link)?;
        // Sponsored status is decided when the result is assembled.
        place.is_spending_on_ads = false;
        Ok(place)
    }
}

/// Bounded worker pool fed by non-blocking submissions.
///
/// Each reference runs in its own task, so a panic while extracting one place
/// fails that reference alone. Finished records are handed back as soon as
/// they complete.
pub struct DetailPipeline {
    sender: Option<mpsc::UnboundedSender<(usize, ListingRef)>>,
    results: mpsc::UnboundedReceiver<(usize, ListingRecord)>,
    workers: JoinSet<()>,
    submitted: Vec<ListingRef>,
}

impl DetailPipeline {
    /// Spawn `concurrency` workers sharing one queue.
    pub fn start(worker: Arc<DetailWorker>, context: Arc<ScanContext>, concurrency: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<(usize, ListingRef)>();
        let (result_sender, results) = mpsc::unbounded_channel::<(usize, ListingRecord)>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = JoinSet::new();

        for worker_id in 0..concurrency.max(1) {
            let receiver = Arc::clone(&receiver);
            let worker = Arc::clone(&worker);
            let context = Arc::clone(&context);
            let result_sender = result_sender.clone();

            workers.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some((index, link)) = next else {
                        break;
                    };
                    tracing::debug!(
                        scan_id = %context.scan_id(),
                        worker_id,
                        %link,
                        "fetching place"
                    );
                    let record =
                        fetch_isolated(Arc::clone(&worker), Arc::clone(&context), link).await;
                    if result_sender.send((index, record)).is_err() {
                        break;
                    }
                }
            });
        }

        Self {
            sender: Some(sender),
            results,
            workers,
            submitted: Vec::new(),
        }
    }

    /// Enqueue a batch without waiting for it to be processed.
    pub fn submit(&mut self, batch: LinkBatch) {
        for link in batch {
            let index = self.submitted.len();
            self.submitted.push(link.clone());
            if let Some(sender) = &self.sender {
                if sender.send((index, link)).is_err() {
                    tracing::error!(index, "detail queue closed, reference will be marked failed");
                }
            }
        }
    }

    /// Wait for every submitted reference, returning records in submission order.
    ///
    /// The result always has one entry per submitted reference.
    pub async fn collect(mut self) -> Vec<ListingRecord> {
        // Closing the queue lets idle workers exit once it drains.
        self.sender.take();

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("detail worker failed: {}", e);
            }
        }

        // Every result sender lived in a worker, so the channel is closed now.
        let mut slots: Vec<Option<ListingRecord>> = vec![None; self.submitted.len()];
        while let Some((index, record)) = self.results.recv().await {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(record);
            }
        }

        slots
            .into_iter()
            .zip(self.submitted)
            .map(|(slot, link)| slot.unwrap_or(ListingRecord::Failed(link)))
            .collect()
    }
}

/// Extract `link` in a dedicated task, turning a panic into a failed record.
async fn fetch_isolated(
    worker: Arc<DetailWorker>,
    context: Arc<ScanContext>,
    link: ListingRef,
) -> ListingRecord {
    let task_link = link.clone();
    let task =
        tokio::spawn(async move { worker.fetch_detail(&task_link, context.cookies()).await });

    match task.await {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(%link, "place extraction aborted: {}", e);
            ListingRecord::Failed(link)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::parser::InitStateParser;
    use crate::testing::{fast_config, place_link, StaticFetcher};
    use mapscout_core::AppConfig;
    use tokio::time::Instant;

    /// Parser that panics on one place name and delegates otherwise.
    struct PanickingParser {
        poison: &'static str,
        inner: InitStateParser,
    }

    impl PlaceParser for PanickingParser {
        fn parse_place(&self, payload: &str, link: &ListingRef) -> Result<Place> {
            if link.as_str().ends_with(self.poison) {
                panic!("unexpected payload shape for {link}");
            }
            self.inner.parse_place(payload, link)
        }

        fn extract_candidate_link(&self, payload: &str) -> Option<String> {
            self.inner.extract_candidate_link(payload)
        }
    }

    fn worker(fetcher: Arc<StaticFetcher>) -> Arc<DetailWorker> {
        Arc::new(DetailWorker::new(
            fetcher,
            Arc::new(InitStateParser::new()),
            &fast_config().detail,
        ))
    }

    fn names(records: &[ListingRecord]) -> Vec<Option<String>> {
        records
            .iter()
            .map(|r| match r {
                ListingRecord::Complete(place) => Some(place.name.clone()),
                ListingRecord::Failed(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_collect_preserves_submission_order() {
        let fetcher = Arc::new(StaticFetcher::new());
        let mut pipeline = DetailPipeline::start(worker(fetcher), Arc::new(ScanContext::new()), 5);

        let batch: LinkBatch = (0..12).map(|i| place_link(&format!("p{i}"))).collect();
        pipeline.submit(batch[..7].to_vec());
        pipeline.submit(batch[7..].to_vec());

        let records = pipeline.collect().await;
        let expected: Vec<_> = (0..12).map(|i| Some(format!("p{i}"))).collect();
        assert_eq!(names(&records), expected);
    }

    #[tokio::test]
    async fn test_failed_reference_does_not_block_siblings() {
        let fetcher = Arc::new(StaticFetcher::new().failing("bad"));
        let mut pipeline =
            DetailPipeline::start(worker(fetcher.clone()), Arc::new(ScanContext::new()), 2);

        pipeline.submit(vec![place_link("a"), place_link("bad"), place_link("c")]);
        let records = pipeline.collect().await;

        assert_eq!(records.len(), 3);
        assert_eq!(
            names(&records),
            vec![Some("a".to_string()), None, Some("c".to_string())]
        );
        assert_eq!(fetcher.calls(&place_link("bad")), 5);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let fetcher = Arc::new(StaticFetcher::new().failing_times("flaky", 2));
        let detail = worker(fetcher.clone());

        let record = detail.fetch_detail(&place_link("flaky"), &HashMap::new()).await;

        assert!(!record.is_failed());
        assert_eq!(fetcher.calls(&place_link("flaky")), 3);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_failure() {
        let fetcher = Arc::new(StaticFetcher::new().malformed("broken"));
        let record = worker(fetcher)
            .fetch_detail(&place_link("broken"), &HashMap::new())
            .await;
        assert!(record.is_failed());
    }

    #[tokio::test]
    async fn test_cache_skips_fetch() {
        let fetcher = Arc::new(StaticFetcher::new());
        let cache: Arc<MemoryCache<Place>> = Arc::new(MemoryCache::new());
        let detail = DetailWorker::new(
            fetcher.clone(),
            Arc::new(InitStateParser::new()),
            &fast_config().detail,
        )
        .with_cache(Some(cache.clone() as Arc<dyn DetailCache>));

        let link = place_link("cached");
        assert!(!detail.fetch_detail(&link, &HashMap::new()).await.is_failed());
        assert!(!detail.fetch_detail(&link, &HashMap::new()).await.is_failed());

        assert_eq!(fetcher.calls(&link), 1);
        assert!(cache.contains(link.as_str()));
    }

    #[tokio::test]
    async fn test_cookies_reach_fetcher() {
        let fetcher = Arc::new(StaticFetcher::new());
        let context = Arc::new(ScanContext::new());
        context.set_cookies([("NID".to_string(), "42".to_string())].into_iter().collect());

        let mut pipeline = DetailPipeline::start(worker(fetcher.clone()), context, 1);
        pipeline.submit(vec![place_link("a")]);
        pipeline.collect().await;

        assert_eq!(fetcher.last_cookies().get("NID").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_collects_nothing() {
        let pipeline = DetailPipeline::start(
            worker(Arc::new(StaticFetcher::new())),
            Arc::new(ScanContext::new()),
            5,
        );
        assert!(pipeline.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_panic_fails_only_that_reference() {
        let parser = PanickingParser {
            poison: "boom",
            inner: InitStateParser::new(),
        };
        let detail = Arc::new(DetailWorker::new(
            Arc::new(StaticFetcher::new()),
            Arc::new(parser),
            &fast_config().detail,
        ));
        let mut pipeline = DetailPipeline::start(detail, Arc::new(ScanContext::new()), 1);

        pipeline.submit(vec![
            place_link("a"),
            place_link("b"),
            place_link("boom"),
            place_link("c"),
        ]);
        let records = pipeline.collect().await;

        assert_eq!(
            names(&records),
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                None,
                Some("c".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_detail_attempts() {
        let mut config = AppConfig::default().detail;
        config.retry_cooldown_ms = 63_000;
        let fetcher = Arc::new(StaticFetcher::new().failing("down"));
        let detail = DetailWorker::new(fetcher.clone(), Arc::new(InitStateParser::new()), &config);

        let started = Instant::now();
        let record = detail.fetch_detail(&place_link("down"), &HashMap::new()).await;

        assert!(record.is_failed());
        assert_eq!(fetcher.calls(&place_link("down")), 5);
        // Four cooldowns between five attempts, none after the last.
        assert!(started.elapsed() >= Duration::from_secs(4 * 63));
        assert!(started.elapsed() < Duration::from_secs(5 * 63));
    }
}
