use mapscout_core::{LinkBatch, ListingRef};
use std::collections::HashSet;

/// Order-preserving filter over every reference submitted during a scan.
#[derive(Debug, Default)]
pub struct LinkDeduplicator {
    seen: HashSet<ListingRef>,
    cap: Option<usize>,
}

impl LinkDeduplicator {
    /// Create a deduplicator, optionally capping the cumulative accepted count.
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            seen: HashSet::new(),
            cap,
        }
    }

    /// Return the unseen references of `batch`, in order, up to the cap.
    pub fn accept(&mut self, batch: impl IntoIterator<Item = ListingRef>) -> LinkBatch {
        let mut accepted = Vec::new();
        for link in batch {
            if self.is_full() {
                break;
            }
            if self.seen.insert(link.clone()) {
                accepted.push(link);
            }
        }
        accepted
    }

    /// Number of references accepted so far.
    pub fn accepted_count(&self) -> usize {
        self.seen.len()
    }

    /// Whether the cap has been reached.
    pub fn is_full(&self) -> bool {
        self.cap.is_some_and(|cap| self.seen.len() >= cap)
    }
}
