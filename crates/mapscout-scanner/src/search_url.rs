use crate::error::Result;
use mapscout_core::{GeneralConfig, MapScoutError, SearchQuery};
use url::Url;

pub fn build_search_url(query: &SearchQuery, general: &GeneralConfig) -> Result<String> {
    let mut url = Url::parse(&general.base_url).map_err(|e| {
        MapScoutError::Validation(format!("invalid base URL '{}': {e}", general.base_url))
    })?;

    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            MapScoutError::Validation(format!("base URL cannot be a base: {}", general.base_url))
        })?;
        segments.pop_if_empty().push("search").push(query.query.trim());

        match query.coordinates {
            Some(coords) => {
                let zoom = query.zoom.unwrap_or(general.default_zoom);
                segments.push(&format!("@{},{},{}z", coords.latitude, coords.longitude, zoom));
            }
            None => {
                segments.push("");
            }
        }
    }

    let lang = if query.lang.trim().is_empty() {
        general.default_lang.as_str()
    } else {
        query.lang.as_str()
    };
    url.query_pairs_mut().append_pair("hl", lang);

    Ok(url.into())
}
