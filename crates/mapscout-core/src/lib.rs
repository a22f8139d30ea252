//! MapScout Core - Foundation crate for the MapScout listing scanner.
//!
//! This crate provides shared types, error handling and configuration
//! management that the browser and scanner crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Queries, listing references, places and result sets
//!
//! # Example
//!
//! ```rust
//! use mapscout_core::{AppConfig, SearchQuery};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let query = SearchQuery::new("bakeries in Porto")?
//!     .with_lang(config.general.default_lang.clone())
//!     .with_max_results(20);
//! assert_eq!(query.max_results, Some(20));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, BrowserConfig, DetailConfig, GeneralConfig, ScanningConfig};
pub use error::{ConfigError, ConfigResult, MapScoutError, Result};
pub use types::{
    Coordinates, LinkBatch, ListingRecord, ListingRef, Place, ResultSet, ScanId, SearchQuery,
    Timestamp,
};
