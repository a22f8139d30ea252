//! Per-scan state shared between discovery and detail workers.

use mapscout_core::{ListingRef, ScanId};
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::OnceCell;

/// State written once during a scan and read by later stages.
///
/// One context exists per scan, so cookies and sponsored links never leak
/// from one scan into another.
#[derive(Debug)]
pub struct ScanContext {
    scan_id: ScanId,
    cookies: OnceLock<HashMap<String, String>>,
    pub(crate) sponsored: OnceCell<Vec<ListingRef>>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self {
            scan_id: ScanId::generate(),
            cookies: OnceLock::new(),
            sponsored: OnceCell::new(),
        }
    }

    pub fn scan_id(&self) -> &ScanId {
        &self.scan_id
    }

    /// Record the session cookies. Later calls within the same scan are ignored.
    pub fn set_cookies(&self, cookies: HashMap<String, String>) -> bool {
        let stored = self.cookies.set(cookies).is_ok();
        if !stored {
            tracing::debug!(scan_id = %self.scan_id, "cookies already recorded for scan");
        }
        stored
    }

    /// Cookies recorded for this scan, empty until the first navigation.
    pub fn cookies(&self) -> &HashMap<String, String> {
        static EMPTY: OnceLock<HashMap<String, String>> = OnceLock::new();
        self.cookies
            .get()
            .unwrap_or_else(|| EMPTY.get_or_init(HashMap::new))
    }

    /// Sponsored links, if they have been resolved already.
    pub fn sponsored_links(&self) -> Option<&[ListingRef]> {
        self.sponsored.get().map(Vec::as_slice)
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new()
    }
}
