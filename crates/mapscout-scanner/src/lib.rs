//! MapScout Scanner - Listing discovery and detail extraction.
//!
//! This crate scrolls a map-search results feed to discover listing
//! references, fetches each discovered place concurrently, and assembles the
//! places into a result set together with a verdict on whether the result is
//! complete enough to cache.
//!
//! # Features
//!
//! - Scroll-driven discovery with stuck detection and end-of-feed handling
//! - Bounded retries for stale DOM reads and stuck feeds
//! - Fixed-size worker pool for place detail fetches with per-link retries
//! - Sponsored placement tagging and an ads-only scan mode
//! - Optional per-place and per-query caches
//!
//! # Example
//!
//! ```rust,ignore
//! use mapscout_scanner::{HttpPlaceFetcher, InitStateParser, ScanOrchestrator};
//! use std::sync::Arc;
//!
//! let orchestrator = ScanOrchestrator::new(
//!     Arc::new(session),
//!     Arc::new(HttpPlaceFetcher::new(&config.detail)?),
//!     Arc::new(InitStateParser::new()),
//!     config,
//! );
//!
//! let outcome = orchestrator.scan(&SearchQuery::new("bakeries in Porto")?).await?;
//! if outcome.cacheable {
//!     store(outcome.result);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod ads;
#[allow(missing_docs)]
pub mod assembler;
pub mod cache;
#[allow(missing_docs)]
pub mod context;
#[allow(missing_docs)]
pub mod dedup;
#[allow(missing_docs)]
pub mod error;
#[allow(missing_docs)]
pub mod feed;
pub mod fetch;
pub mod orchestrator;
#[allow(missing_docs)]
pub mod parser;
pub mod pipeline;
#[allow(missing_docs)]
pub mod retry;
#[allow(missing_docs)]
pub mod search_url;

#[cfg(any(test, feature = "test-support"))]
#[allow(missing_docs)]
pub mod testing;

// Re-export commonly used types
pub use ads::AdsClassifier;
pub use assembler::{ResultAssembler, ScanOutcome};
pub use cache::{DetailCache, MemoryCache, ResultCache};
pub use context::ScanContext;
pub use dedup::LinkDeduplicator;
pub use error::{Result, ScanError};
pub use feed::{FeedScanController, FeedSettings, ScanStep, ScrollState};
pub use fetch::{HttpPlaceFetcher, PlaceFetcher};
pub use orchestrator::ScanOrchestrator;
pub use parser::{InitStateParser, PlaceParser};
pub use pipeline::{DetailPipeline, DetailWorker};
pub use retry::{Discovery, DiscoveryReport, RetryEscalator, RetryPolicy};
pub use search_url::build_search_url;
