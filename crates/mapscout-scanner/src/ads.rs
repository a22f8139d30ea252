//! Sponsored placement detection.

use crate::context::ScanContext;
use crate::error::Result;
use mapscout_browser::Session;
use mapscout_core::{ListingRef, Place};
use std::collections::HashSet;

/// Page-side script returning the links of feed entries labelled as sponsored.
pub const SPONSORED_LINKS_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('[role="feed"] > div > div > a'))
    .filter((a) => {
        const card = a.parentElement;
        if (!card) return false;
        return Array.from(card.querySelectorAll('span'))
            .some((s) => s.textContent.trim() === 'Sponsored');
    })
    .map((a) => a.href))()"#;

/// Resolves and applies the sponsored-link set of one scan.
pub struct AdsClassifier<'a> {
    context: &'a ScanContext,
}

impl<'a> AdsClassifier<'a> {
    pub fn new(context: &'a ScanContext) -> Self {
        Self { context }
    }

    /// Sponsored links of the current feed, resolved on first call and memoized.
    pub async fn sponsored_links<S>(&self, session: &S) -> Result<&'a [ListingRef]>
    where
        S: Session + ?Sized,
    {
        let links = self
            .context
            .sponsored
            .get_or_try_init(|| async {
                let value = session.execute_script(SPONSORED_LINKS_SCRIPT).await?;
                let links = parse_sponsored(&value);
                tracing::debug!(
                    scan_id = %self.context.scan_id(),
                    count = links.len(),
                    "resolved sponsored links"
                );
                Ok::<_, crate::error::ScanError>(links)
            })
            .await?;
        Ok(links.as_slice())
    }
}

fn parse_sponsored(value: &serde_json::Value) -> Vec<ListingRef> {
    let Some(items) = value.as_array() else {
        tracing::warn!("sponsored link script returned a non-list value");
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(serde_json::Value::as_str)
        .filter_map(|link| ListingRef::new(link).ok())
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Mark each place whose link is in the sponsored set.
pub fn tag_sponsored(places: &mut [Place], sponsored: &[ListingRef]) {
    let sponsored: HashSet<&str> = sponsored.iter().map(ListingRef::as_str).collect();
    for place in places {
        place.is_spending_on_ads = sponsored.contains(place.link.as_str());
    }
}
