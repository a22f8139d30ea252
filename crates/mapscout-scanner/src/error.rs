use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("feed made no scroll progress for {elapsed:?}")]
    StuckInFeed { elapsed: Duration },

    #[error("detail fetch failed for {url}: {reason}")]
    DetailFetch { url: String, reason: String },

    #[error("initialization payload missing for {link}: {reason}")]
    MalformedPayload { link: String, reason: String },

    #[error("failed to parse place from {link}: {reason}")]
    Parse { link: String, reason: String },

    #[error("detail worker failed: {0}")]
    Worker(String),

    #[error("Browser error: {0}")]
    Browser(#[from] mapscout_browser::BrowserError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Core error: {0}")]
    Core(#[from] mapscout_core::MapScoutError),
}

impl ScanError {
    /// Whether the error is a transient stale-element condition from the session.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Browser(e) if e.is_stale())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
