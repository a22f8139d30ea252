use mapscout_core::{Place, ResultSet, SearchQuery};
use mapscout_scanner::testing::{
    collapsed_search_html, fast_config, place_link, place_url, FeedFrame, ScriptedSession,
    StaticFetcher,
};
use mapscout_scanner::{InitStateParser, MemoryCache, ScanOrchestrator, ScanOutcome};
use std::sync::Arc;
use tokio_test::assert_ok;

fn session() -> ScriptedSession {
    ScriptedSession::new(&fast_config().scanning)
}

fn orchestrator(session: &Arc<ScriptedSession>, fetcher: &Arc<StaticFetcher>) -> ScanOrchestrator {
    ScanOrchestrator::new(
        session.clone(),
        fetcher.clone(),
        Arc::new(InitStateParser::new()),
        fast_config(),
    )
}

fn query(text: &str) -> SearchQuery {
    SearchQuery::new(text).expect("valid query")
}

fn names(outcome: &ScanOutcome) -> Vec<&str> {
    outcome
        .result
        .places
        .iter()
        .map(|p| p.name.as_str())
        .collect()
}

#[tokio::test]
async fn test_redirect_to_single_place() {
    let session = Arc::new(session().without_feed(&place_url("Solo")));
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("solo cafe")).await);

    assert_eq!(names(&outcome), vec!["Solo"]);
    assert_eq!(session.scroll_calls(), 0);
    assert!(outcome.cacheable);
}

#[tokio::test]
async fn test_collapsed_search_recovers_place() {
    let session = Arc::new(
        session()
            .without_feed("https://www.google.com/maps/search/solo+cafe/")
            .with_page_source(collapsed_search_html(&place_url("Solo"))),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("solo cafe")).await);

    assert_eq!(names(&outcome), vec!["Solo"]);
    assert_eq!(session.scroll_calls(), 0);
}

#[tokio::test]
async fn test_collapsed_search_without_candidate_is_empty() {
    let session = Arc::new(session().without_feed("https://www.google.com/maps/search/nowhere/"));
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("nowhere")).await);

    assert!(outcome.result.places.is_empty());
    assert!(outcome.cacheable);
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_batches_are_deduplicated_in_discovery_order() {
    let session = Arc::new(session().with_frames(vec![
        FeedFrame::new(&["a", "b"]),
        FeedFrame::new(&["b", "c"]).with_end_marker(),
    ]));
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert_eq!(names(&outcome), vec!["a", "b", "c"]);
    assert_eq!(fetcher.calls(&place_link("b")), 1);
    assert!(outcome.cacheable);
    assert!(!outcome.result.had_failures);
    assert!(!outcome.result.failed_to_scroll);
    assert_eq!(outcome.result.query, "cafes");
}

#[tokio::test]
async fn test_max_results_stops_after_first_batch() {
    let session = Arc::new(session().with_frames(vec![
        FeedFrame::new(&["a", "b", "c"]),
        FeedFrame::new(&["d"]).with_end_marker(),
    ]));
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(
        orchestrator(&session, &fetcher)
            .scan(&query("cafes").with_max_results(2))
            .await
    );

    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert_eq!(session.scroll_calls(), 1);
    assert_eq!(fetcher.calls(&place_link("c")), 0);
}

#[tokio::test]
async fn test_failing_reference_marks_result_uncacheable() {
    let session = Arc::new(
        session().with_frames(vec![FeedFrame::new(&["a", "x", "b"]).with_end_marker()]),
    );
    let fetcher = Arc::new(StaticFetcher::new().failing("x"));

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert!(outcome.result.had_failures);
    assert!(!outcome.cacheable);
    assert_eq!(fetcher.calls(&place_link("x")), 5);
}

#[tokio::test]
async fn test_stuck_on_every_attempt_keeps_partial_results() {
    let session = Arc::new(
        session().with_frames(vec![FeedFrame::new(&["a"]), FeedFrame::new(&["b"])]),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert!(outcome.result.failed_to_scroll);
    assert!(!outcome.cacheable);
    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert_eq!(session.navigations().len(), 3);
    assert_eq!(fetcher.calls(&place_link("a")), 1);
}

#[tokio::test]
async fn test_stuck_then_recovers_on_retry() {
    let session = Arc::new(
        session()
            .with_frames(vec![
                FeedFrame::new(&["a"]),
                FeedFrame::new(&["b"]).with_end_marker(),
            ])
            .with_end_marker_hidden_for(1),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert!(!outcome.result.failed_to_scroll);
    assert!(outcome.cacheable);
    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert_eq!(session.navigations().len(), 2);
}

#[tokio::test]
async fn test_stale_reads_are_retried_in_place() {
    let session = Arc::new(
        session()
            .with_frames(vec![FeedFrame::new(&["a", "b"]).with_end_marker()])
            .with_stale_reads(2),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert_eq!(session.navigations().len(), 1);
    assert!(outcome.cacheable);
}

#[tokio::test]
async fn test_persistent_staleness_gives_up_silently() {
    let session = Arc::new(
        session()
            .with_frames(vec![FeedFrame::new(&["a"]).with_end_marker()])
            .with_stale_reads(100),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert!(outcome.result.places.is_empty());
    assert!(!outcome.result.failed_to_scroll);
    assert_eq!(session.navigations().len(), 1);
}

#[tokio::test]
async fn test_ads_only_scan_submits_sponsored_links() {
    let session = Arc::new(
        session()
            .with_frames(vec![FeedFrame::new(&["a"]).with_end_marker()])
            .with_sponsored(&[place_url("ad1"), place_url("ad2")]),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(
        orchestrator(&session, &fetcher)
            .scan(&query("cafes").with_spending_on_ads(true))
            .await
    );

    assert_eq!(names(&outcome), vec!["ad1", "ad2"]);
    assert!(outcome.result.places.iter().all(|p| p.is_spending_on_ads));
    assert_eq!(session.scroll_calls(), 0);
    assert_eq!(session.script_calls(), 1);
    assert_eq!(fetcher.calls(&place_link("a")), 0);
}

#[tokio::test]
async fn test_sponsored_places_are_tagged() {
    let session = Arc::new(
        session()
            .with_frames(vec![FeedFrame::new(&["a", "b"]).with_end_marker()])
            .with_sponsored(&[place_url("b")]),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    let flags: Vec<_> = outcome
        .result
        .places
        .iter()
        .map(|p| p.is_spending_on_ads)
        .collect();
    assert_eq!(flags, vec![false, true]);
    assert_eq!(session.script_calls(), 1);
}

#[tokio::test]
async fn test_stale_sponsored_lookup_is_retried() {
    let session = Arc::new(
        session()
            .with_frames(vec![FeedFrame::new(&["a", "b"]).with_end_marker()])
            .with_sponsored(&[place_url("b")])
            .with_stale_scripts(2),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert!(outcome.result.places[1].is_spending_on_ads);
    assert_eq!(session.script_calls(), 3);
    assert!(outcome.cacheable);
}

#[tokio::test]
async fn test_stale_sponsored_lookup_keeps_places() {
    let session = Arc::new(
        session()
            .with_frames(vec![FeedFrame::new(&["a", "b"]).with_end_marker()])
            .with_sponsored(&[place_url("b")])
            .with_stale_scripts(100),
    );
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert!(outcome.result.places.iter().all(|p| !p.is_spending_on_ads));
    assert!(!outcome.result.had_failures);
    assert!(!outcome.cacheable);
    assert_eq!(
        session.script_calls(),
        fast_config().scanning.stale_retries as usize + 1
    );
}

#[tokio::test]
async fn test_empty_feed_is_cacheable() {
    let session = Arc::new(session().with_frames(vec![FeedFrame::new(&[]).with_end_marker()]));
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(orchestrator(&session, &fetcher).scan(&query("nothing")).await);

    assert!(outcome.result.places.is_empty());
    assert!(!outcome.result.had_failures);
    assert!(outcome.cacheable);
}

#[tokio::test]
async fn test_scan_cookies_reach_detail_fetches() {
    let session = Arc::new(session().with_frames(vec![FeedFrame::new(&["a"]).with_end_marker()]));
    let fetcher = Arc::new(StaticFetcher::new());

    assert_ok!(orchestrator(&session, &fetcher).scan(&query("cafes")).await);

    assert_eq!(
        fetcher.last_cookies().get("NID").map(String::as_str),
        Some("scripted")
    );
}

#[tokio::test]
async fn test_result_cache_stores_complete_results_only() {
    let cache: MemoryCache<ResultSet> = MemoryCache::new();

    let session = Arc::new(session().with_frames(vec![FeedFrame::new(&["a"]).with_end_marker()]));
    let fetcher = Arc::new(StaticFetcher::new());
    let scanner = orchestrator(&session, &fetcher);

    let first = assert_ok!(scanner.scan_with_cache(&query("cafes"), &cache).await);
    let second = assert_ok!(scanner.scan_with_cache(&query("cafes"), &cache).await);

    assert_eq!(cache.len(), 1);
    assert_eq!(first.result, second.result);
    assert_eq!(session.navigations().len(), 1);
    assert_eq!(fetcher.total_calls(), 1);

    let failing_session =
        Arc::new(self::session().with_frames(vec![FeedFrame::new(&["x"]).with_end_marker()]));
    let failing_fetcher = Arc::new(StaticFetcher::new().failing("x"));
    let degraded = assert_ok!(
        orchestrator(&failing_session, &failing_fetcher)
            .scan_with_cache(&query("bars"), &cache)
            .await
    );

    assert!(!degraded.cacheable);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_detail_cache_skips_repeat_fetches() {
    let session = Arc::new(
        session().with_frames(vec![FeedFrame::new(&["a", "b"]).with_end_marker()]),
    );
    let fetcher = Arc::new(StaticFetcher::new());
    let scanner = orchestrator(&session, &fetcher)
        .with_detail_cache(Arc::new(MemoryCache::<Place>::new()));

    assert_ok!(scanner.scan(&query("cafes")).await);
    let outcome = assert_ok!(scanner.scan(&query("cafes")).await);

    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert_eq!(fetcher.calls(&place_link("a")), 1);
    assert_eq!(fetcher.calls(&place_link("b")), 1);
}

#[tokio::test]
async fn test_single_worker_preserves_order() {
    let names_in: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();
    let refs: Vec<&str> = names_in.iter().map(String::as_str).collect();
    let session = Arc::new(session().with_frames(vec![FeedFrame::new(&refs).with_end_marker()]));
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(
        orchestrator(&session, &fetcher)
            .with_max_concurrent_fetches(1)
            .scan(&query("cafes"))
            .await
    );

    assert_eq!(names(&outcome), refs);
}

#[tokio::test]
async fn test_scan_links_skips_discovery() {
    let session = Arc::new(session());
    let fetcher = Arc::new(StaticFetcher::new());

    let outcome = assert_ok!(
        orchestrator(&session, &fetcher)
            .scan_links(vec![place_link("a"), place_link("b"), place_link("a")], false)
            .await
    );

    assert_eq!(names(&outcome), vec!["a", "b"]);
    assert_eq!(session.navigations(), vec![fast_config().general.base_url]);
    assert_eq!(session.scroll_calls(), 0);
    assert!(outcome.cacheable);
    assert_eq!(
        fetcher.last_cookies().get("NID").map(String::as_str),
        Some("scripted")
    );
}

#[tokio::test]
async fn test_fetch_detail() {
    let session = Arc::new(session());
    let fetcher = Arc::new(StaticFetcher::new().failing("gone"));
    let scanner = orchestrator(&session, &fetcher);

    let place = assert_ok!(scanner.fetch_detail(&place_link("here")).await);
    assert_eq!(place.map(|p| p.name), Some("here".to_string()));

    let missing = assert_ok!(scanner.fetch_detail(&place_link("gone")).await);
    assert!(missing.is_none());
}
