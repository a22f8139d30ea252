//! Browser session layer for map-feed discovery.
//!
//! Defines the [`Session`] contract the discovery loop drives and a
//! headless Chromium implementation of it.

pub mod engine;
pub mod error;
pub mod session;

pub use engine::ChromiumSession;
pub use error::{BrowserError, Result};
pub use session::{extract_path, Session};
