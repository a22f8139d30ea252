use crate::error::{Result, ScanError};
use mapscout_core::{Coordinates, ListingRef, Place};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;

/// Marker preceding the embedded initialization payload in a place page.
pub const INIT_STATE_START: &str = ";window.APP_INITIALIZATION_STATE=";

/// Marker following the embedded initialization payload.
pub const INIT_STATE_END: &str = ";window.APP_FLAGS";

/// Prefix guarding the nested JSON document inside the payload.
const XSSI_PREFIX: &str = ")]}'";

/// Turns raw initialization payloads into places.
pub trait PlaceParser: Send + Sync {
    /// Parse the payload of a place page into a structured record.
    fn parse_place(&self, payload: &str, link: &ListingRef) -> Result<Place>;

    /// Find a single place link inside the payload of a collapsed search page.
    fn extract_candidate_link(&self, payload: &str) -> Option<String>;
}

/// Slice the initialization payload out of a page body.
pub fn extract_initialization_state<'a>(html: &'a str, link: &str) -> Result<&'a str> {
    let start = html
        .find(INIT_STATE_START)
        .ok_or_else(|| ScanError::MalformedPayload {
            link: link.to_string(),
            reason: "start marker not found".to_string(),
        })?
        + INIT_STATE_START.len();

    let rest = &html[start..];
    let end = rest
        .find(INIT_STATE_END)
        .ok_or_else(|| ScanError::MalformedPayload {
            link: link.to_string(),
            reason: "end marker not found".to_string(),
        })?;

    Ok(&rest[..end])
}

/// Recover the one place a collapsed search page points at, if any.
///
/// Only links whose path starts with `/maps/place` are accepted.
pub fn extract_possible_map_link(parser: &dyn PlaceParser, html: &str) -> Option<ListingRef> {
    let candidate = match extract_initialization_state(html, "search page") {
        Ok(payload) => parser.extract_candidate_link(payload),
        Err(_) => None,
    }
    .or_else(|| candidate_from_document(html))?;

    ListingRef::new(candidate)
        .ok()
        .filter(ListingRef::is_place_link)
}

/// Canonical URL declared by the document head.
fn candidate_from_document(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[property="og:url"], link[rel="canonical"]"#).ok()?;

    document.select(&selector).find_map(|el| {
        el.value()
            .attr("content")
            .or_else(|| el.value().attr("href"))
            .map(str::to_string)
    })
}

/// Parser for the array-encoded initialization state of place pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct InitStateParser;

impl InitStateParser {
    pub fn new() -> Self {
        Self
    }

    fn place_info(payload: &str, link: &ListingRef) -> Result<Value> {
        let parse_err = |reason: String| ScanError::Parse {
            link: link.to_string(),
            reason,
        };

        let outer: Value = serde_json::from_str(payload)
            .map_err(|e| parse_err(format!("payload is not JSON: {e}")))?;
        let raw = outer
            .pointer("/3/6")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_err("nested place document missing".to_string()))?;

        let inner: Value = serde_json::from_str(raw.trim_start_matches(XSSI_PREFIX).trim_start())
            .map_err(|e| parse_err(format!("nested place document is not JSON: {e}")))?;

        inner
            .get(6)
            .filter(|info| info.is_array())
            .cloned()
            .ok_or_else(|| parse_err("place info block missing".to_string()))
    }
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl PlaceParser for InitStateParser {
    fn parse_place(&self, payload: &str, link: &ListingRef) -> Result<Place> {
        let info = Self::place_info(payload, link)?;

        let name = str_at(&info, "/11").ok_or_else(|| ScanError::Parse {
            link: link.to_string(),
            reason: "place has no name".to_string(),
        })?;

        let categories: Vec<String> = info
            .pointer("/13")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let address = str_at(&info, "/39").or_else(|| {
            info.pointer("/2").and_then(Value::as_array).map(|parts| {
                parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
        });

        let coordinates = match (
            info.pointer("/9/2").and_then(Value::as_f64),
            info.pointer("/9/3").and_then(Value::as_f64),
        ) {
            (Some(lat), Some(lng)) => Coordinates::new(lat, lng).ok(),
            _ => None,
        };

        Ok(Place {
            place_id: str_at(&info, "/78"),
            name,
            link: link.to_string(),
            address: address.filter(|a| !a.is_empty()),
            rating: info.pointer("/4/7").and_then(Value::as_f64),
            reviews: info.pointer("/4/8").and_then(Value::as_u64),
            main_category: categories.first().cloned(),
            categories,
            website: str_at(&info, "/7/0"),
            phone: str_at(&info, "/178/0/0"),
            coordinates,
            is_spending_on_ads: false,
        })
    }

    fn extract_candidate_link(&self, payload: &str) -> Option<String> {
        static PLACE_LINK: OnceLock<Regex> = OnceLock::new();
        let regex = PLACE_LINK.get_or_init(|| {
            Regex::new(r#"https://www\.google\.[a-z.]+/maps/place/[^"\\\s]+"#)
                .expect("valid regex")
        });

        regex.find(payload).map(|m| m.as_str().to_string())
    }
}
