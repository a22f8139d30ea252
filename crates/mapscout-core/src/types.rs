//! Shared types used across the MapScout crates.
//!
//! This module defines the query, listing and result types that flow from
//! discovery through detail extraction to result assembly.

use crate::error::MapScoutError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a single scan, used to correlate log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(String);

impl ScanId {
    /// Create a new random `ScanId` using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for listing references (the URL of one place).
///
/// References must be absolute `http` or `https` URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingRef(String);

impl ListingRef {
    /// Create a new `ListingRef` from a string.
    ///
    /// # Errors
    /// Returns error if the reference is not an absolute http(s) URL.
    pub fn new(link: impl Into<String>) -> Result<Self, MapScoutError> {
        let link = link.into();
        Self::validate(&link)?;
        Ok(Self(link))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component of the reference, e.g. `/maps/place/...`.
    #[must_use]
    pub fn path(&self) -> String {
        url::Url::parse(&self.0)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }

    /// Whether this reference points at a single place page.
    #[must_use]
    pub fn is_place_link(&self) -> bool {
        self.path().starts_with("/maps/place")
    }

    fn validate(link: &str) -> Result<(), MapScoutError> {
        let parsed = url::Url::parse(link).map_err(|e| {
            MapScoutError::Validation(format!("invalid listing reference '{link}': {e}"))
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(MapScoutError::Validation(format!(
                "invalid listing reference: unsupported scheme '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ListingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ListingRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An ordered sequence of references discovered in one scroll iteration.
pub type LinkBatch = Vec<ListingRef>;

/// A validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, -90..=90
    pub latitude: f64,
    /// Longitude in degrees, -180..=180
    pub longitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair.
    ///
    /// # Errors
    /// Returns error if either component is out of range or not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, MapScoutError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(MapScoutError::Validation(format!(
                "latitude must be within -90..=90, got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(MapScoutError::Validation(format!(
                "longitude must be within -180..=180, got {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A search to run against the map surface. Read-only once a scan begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query, e.g. "coffee shops in Lisbon"
    pub query: String,
    /// Interface language code, e.g. "en"
    pub lang: String,
    /// Optional map center
    pub coordinates: Option<Coordinates>,
    /// Optional zoom level (used only with `coordinates`)
    pub zoom: Option<u8>,
    /// Stop after this many unique references
    pub max_results: Option<usize>,
    /// Transliterate text fields to ASCII in the result
    pub convert_to_english: bool,
    /// Only the sponsored placements are wanted
    pub is_spending_on_ads: bool,
}

impl SearchQuery {
    /// Create a query with default options.
    ///
    /// # Errors
    /// Returns error if the query text is blank.
    pub fn new(query: impl Into<String>) -> Result<Self, MapScoutError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(MapScoutError::Validation(
                "search query must not be empty".to_string(),
            ));
        }
        Ok(Self {
            query,
            lang: "en".to_string(),
            coordinates: None,
            zoom: None,
            max_results: None,
            convert_to_english: false,
            is_spending_on_ads: false,
        })
    }

    /// Set the interface language.
    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Center the search on a coordinate with an optional zoom.
    #[must_use]
    pub fn with_coordinates(mut self, coordinates: Coordinates, zoom: Option<u8>) -> Self {
        self.coordinates = Some(coordinates);
        self.zoom = zoom;
        self
    }

    /// Cap the number of unique references.
    #[must_use]
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Enable ASCII transliteration of the result.
    #[must_use]
    pub fn with_convert_to_english(mut self, convert: bool) -> Self {
        self.convert_to_english = convert;
        self
    }

    /// Request sponsored placements only.
    #[must_use]
    pub fn with_spending_on_ads(mut self, ads_only: bool) -> Self {
        self.is_spending_on_ads = ads_only;
        self
    }

    /// Stable key identifying this query for result caching.
    ///
    /// Fields are encoded as a JSON array so separators inside free text
    /// cannot make two queries collide.
    #[must_use]
    pub fn cache_key(&self) -> String {
        serde_json::json!([
            self.query,
            self.lang,
            self.coordinates.map(|c| [c.latitude, c.longitude]),
            self.zoom,
            self.max_results,
            self.convert_to_english,
            self.is_spending_on_ads,
        ])
        .to_string()
    }
}

/// A fully extracted place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Place {
    /// Provider place identifier
    pub place_id: Option<String>,
    /// Business name
    pub name: String,
    /// The reference this record was extracted from
    pub link: String,
    /// Formatted address
    pub address: Option<String>,
    /// Average rating
    pub rating: Option<f64>,
    /// Number of reviews
    pub reviews: Option<u64>,
    /// First category, if any
    pub main_category: Option<String>,
    /// All categories
    pub categories: Vec<String>,
    /// Business website
    pub website: Option<String>,
    /// Phone number
    pub phone: Option<String>,
    /// Location of the place
    pub coordinates: Option<Coordinates>,
    /// Whether the place showed up as a sponsored placement
    pub is_spending_on_ads: bool,
}

/// Result of detail extraction for one reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingRecord {
    /// Extraction succeeded
    Complete(Place),
    /// Extraction failed after all retries
    Failed(ListingRef),
}

impl ListingRecord {
    /// Whether this is a failure marker.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Consume the record, returning the place if extraction succeeded.
    #[must_use]
    pub fn into_place(self) -> Option<Place> {
        match self {
            Self::Complete(place) => Some(place),
            Self::Failed(_) => None,
        }
    }
}

/// Aggregate result of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Query text the scan ran for
    pub query: String,
    /// Successfully extracted places, in discovery order
    pub places: Vec<Place>,
    /// At least one reference failed extraction and was dropped
    pub had_failures: bool,
    /// The feed got stuck on every scan attempt
    pub failed_to_scroll: bool,
    /// When the result was assembled
    pub scanned_at: Timestamp,
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_id_generate() {
        let id1 = ScanId::generate();
        let id2 = ScanId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_listing_ref_valid() {
        let link = "https://www.google.com/maps/place/Cafe+Central/data=!4m7";
        let reference = ListingRef::new(link).expect("valid listing ref");
        assert_eq!(reference.as_str(), link);
        assert!(reference.is_place_link());
    }

    #[test]
    fn test_listing_ref_invalid() {
        let invalid = vec!["", "not-a-url", "ftp://example.com/maps/place/x"];

        for link in invalid {
            assert!(ListingRef::new(link).is_err(), "Should fail for: {link}");
        }
    }

    #[test]
    fn test_listing_ref_search_is_not_place() {
        let reference =
            ListingRef::new("https://www.google.com/maps/search/pizza").expect("valid listing ref");
        assert!(!reference.is_place_link());
    }

    #[test]
    fn test_coordinates_bounds() {
        assert!(Coordinates::new(38.72, -9.14).is_ok());
        assert!(Coordinates::new(90.1, 0.0).is_err());
        assert!(Coordinates::new(0.0, -180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_search_query_rejects_blank() {
        assert!(SearchQuery::new("   ").is_err());
    }

    #[test]
    fn test_search_query_builder() {
        let query = SearchQuery::new("bakery")
            .expect("valid query")
            .with_lang("pt")
            .with_max_results(10)
            .with_convert_to_english(true);

        assert_eq!(query.lang, "pt");
        assert_eq!(query.max_results, Some(10));
        assert!(query.convert_to_english);
        assert!(!query.is_spending_on_ads);
    }

    #[test]
    fn test_cache_key_differs_by_options() {
        let base = SearchQuery::new("bakery").expect("valid query");
        let capped = base.clone().with_max_results(5);
        assert_ne!(base.cache_key(), capped.cache_key());
        assert_eq!(base.cache_key(), base.clone().cache_key());
    }

    #[test]
    fn test_cache_key_separator_in_text_does_not_collide() {
        let piped_query = SearchQuery::new("pizza|en")
            .expect("valid query")
            .with_lang("fr");
        let piped_lang = SearchQuery::new("pizza")
            .expect("valid query")
            .with_lang("en|fr");
        assert_ne!(piped_query.cache_key(), piped_lang.cache_key());
    }

    #[test]
    fn test_listing_record_into_place() {
        let place = Place {
            name: "Cafe".to_string(),
            ..Place::default()
        };
        assert_eq!(
            ListingRecord::Complete(place.clone()).into_place(),
            Some(place)
        );

        let failed = ListingRecord::Failed(
            ListingRef::new("https://www.google.com/maps/place/x").expect("valid listing ref"),
        );
        assert!(failed.is_failed());
        assert!(failed.into_place().is_none());
    }

    #[test]
    fn test_place_serialization() {
        let place = Place {
            name: "Cafe".to_string(),
            link: "https://www.google.com/maps/place/cafe".to_string(),
            rating: Some(4.5),
            ..Place::default()
        };
        let json = serde_json::to_string(&place).expect("serialize place");
        assert!(json.contains("\"is_spending_on_ads\":false"));

        let parsed: Place = serde_json::from_str(&json).expect("deserialize place");
        assert_eq!(parsed, place);
    }
}
