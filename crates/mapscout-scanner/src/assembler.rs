//! Final result assembly and the cacheability verdict.

use crate::ads::tag_sponsored;
use mapscout_core::{ListingRecord, ListingRef, Place, ResultSet, Timestamp};
use serde::Serialize;

/// An assembled result together with whether it may be memoized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub result: ResultSet,
    /// `false` when the result is known to be incomplete
    pub cacheable: bool,
}

/// Merges detail records with sponsored metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler {
    convert_to_english: bool,
}

impl ResultAssembler {
    #[must_use]
    pub fn new(convert_to_english: bool) -> Self {
        Self { convert_to_english }
    }

    /// Build the result set for `query` from collected records.
    #[must_use]
    pub fn assemble(
        &self,
        query: &str,
        records: Vec<ListingRecord>,
        sponsored: &[ListingRef],
        failed_to_scroll: bool,
    ) -> ScanOutcome {
        let had_failures = records.iter().any(ListingRecord::is_failed);

        let mut places: Vec<Place> = records
            .into_iter()
            .filter_map(ListingRecord::into_place)
            .collect();
        tag_sponsored(&mut places, sponsored);

        if self.convert_to_english {
            places.iter_mut().for_each(transliterate);
        }

        ScanOutcome {
            result: ResultSet {
                query: query.to_string(),
                places,
                had_failures,
                failed_to_scroll,
                scanned_at: Timestamp::now(),
            },
            cacheable: !(had_failures || failed_to_scroll),
        }
    }
}

/// Replace non-ASCII text with its closest ASCII rendering.
///
/// Identifiers and URLs are left untouched.
fn transliterate(place: &mut Place) {
    fn ascii(s: &mut String) {
        *s = deunicode::deunicode(s);
    }

    ascii(&mut place.name);
    for field in [&mut place.address, &mut place.main_category, &mut place.phone] {
        if let Some(value) = field {
            ascii(value);
        }
    }
    place.categories.iter_mut().for_each(ascii);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(name: &str) -> ListingRecord {
        ListingRecord::Complete(Place {
            name: name.to_string(),
            link: format!("https://www.google.com/maps/place/{name}"),
            ..Place::default()
        })
    }

    fn failed(name: &str) -> ListingRecord {
        ListingRecord::Failed(
            ListingRef::new(format!("https://www.google.com/maps/place/{name}")).unwrap(),
        )
    }

    #[test]
    fn test_complete_result_is_cacheable() {
        let records = vec![complete("a"), complete("b")];
        let outcome = ResultAssembler::default().assemble("cafes", records, &[], false);

        assert!(outcome.cacheable);
        assert!(!outcome.result.had_failures);
        assert_eq!(outcome.result.query, "cafes");
        assert_eq!(outcome.result.places.len(), 2);
    }

    #[test]
    fn test_failures_are_dropped_and_flagged() {
        let outcome = ResultAssembler::default().assemble(
            "cafes",
            vec![complete("a"), failed("x"), complete("b")],
            &[],
            false,
        );

        assert!(outcome.result.had_failures);
        assert!(!outcome.cacheable);
        let names: Vec<_> = outcome.result.places.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_failed_to_scroll_is_not_cacheable() {
        let outcome = ResultAssembler::default().assemble("cafes", vec![complete("a")], &[], true);

        assert!(!outcome.result.had_failures);
        assert!(outcome.result.failed_to_scroll);
        assert!(!outcome.cacheable);
    }

    #[test]
    fn test_empty_result_is_cacheable() {
        let outcome = ResultAssembler::default().assemble("nothing here", Vec::new(), &[], false);

        assert!(outcome.result.places.is_empty());
        assert!(!outcome.result.had_failures);
        assert!(outcome.cacheable);
    }

    #[test]
    fn test_sponsored_places_are_tagged() {
        let sponsored = vec![ListingRef::new("https://www.google.com/maps/place/b").unwrap()];
        let outcome = ResultAssembler::default().assemble(
            "cafes",
            vec![complete("a"), complete("b")],
            &sponsored,
            false,
        );

        let flags: Vec<_> = outcome
            .result
            .places
            .iter()
            .map(|p| p.is_spending_on_ads)
            .collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn test_transliteration_of_text_fields() {
        let record = ListingRecord::Complete(Place {
            name: "Café Łódź".to_string(),
            link: "https://www.google.com/maps/place/Caf%C3%A9".to_string(),
            address: Some("Straße 5, Zürich".to_string()),
            main_category: Some("Café".to_string()),
            categories: vec!["Café".to_string(), "Bäckerei".to_string()],
            ..Place::default()
        });

        let outcome = ResultAssembler::new(true).assemble("cafe", vec![record], &[], false);
        let place = &outcome.result.places[0];

        assert_eq!(place.name, "Cafe Lodz");
        assert_eq!(place.address.as_deref(), Some("Strasse 5, Zurich"));
        assert_eq!(place.categories, vec!["Cafe", "Backerei"]);
        assert_eq!(place.link, "https://www.google.com/maps/place/Caf%C3%A9");
    }

    #[test]
    fn test_no_transliteration_by_default() {
        let outcome =
            ResultAssembler::default().assemble("cafe", vec![complete("Café")], &[], false);
        assert_eq!(outcome.result.places[0].name, "Café");
    }
}
