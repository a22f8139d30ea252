use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// The element was detached from the document between lookup and use.
    #[error("stale element: {0}")]
    StaleElement(String),

    #[error("script error: {0}")]
    ScriptError(String),
}

impl BrowserError {
    /// Whether the error is a transient DOM staleness condition.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement(_))
    }

    /// Classify a raw CDP error message, keeping detached-node failures distinguishable.
    pub fn from_cdp_message(message: impl Into<String>) -> Self {
        const STALE_MARKERS: [&str; 4] = [
            "No node with given id",
            "Could not find node",
            "does not belong to the document",
            "Cannot find context with specified id",
        ];

        let message = message.into();
        if STALE_MARKERS.iter().any(|m| message.contains(m)) {
            Self::StaleElement(message)
        } else {
            Self::ChromiumError(message)
        }
    }
}
