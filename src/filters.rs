//! Event filtering logic.
//!
//! The dashboard narrows the fetched set by two criteria: a minimum
//! magnitude and a case-insensitive substring match on the place text.
//! Both are pure and keep the feed's relative order.

use crate::client::TimeWindow;
use crate::models::Feature;

/// Filter criteria mirrored into the page URL.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    /// Which summary feed to show
    pub window: TimeWindow,
    /// Inclusive lower bound on magnitude
    pub min_magnitude: f64,
    /// Place search text, as typed
    pub query: String,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            window: TimeWindow::default(),
            min_magnitude: 0.0,
            query: String::new(),
        }
    }
}

impl FilterCriteria {
    /// Apply the criteria to a record set.
    #[must_use]
    pub fn apply<'a>(&self, records: &'a [Feature]) -> Vec<&'a Feature> {
        filter_events(records, self.min_magnitude, &self.query)
    }
}

/// Normalized place search: trimmed and lowercased once.
#[derive(Debug, Clone)]
struct PlaceQuery(String);

impl PlaceQuery {
    fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    fn matches(&self, event: &Feature) -> bool {
        self.0.is_empty() || event.place().to_lowercase().contains(&self.0)
    }
}

/// Select the records with `magnitude >= min_magnitude` whose place
/// contains `query`, ignoring case and surrounding whitespace.
///
/// A missing magnitude counts as 0 and a missing place as empty text; an
/// empty query matches everything.
#[must_use]
pub fn filter_events<'a>(records: &'a [Feature], min_magnitude: f64, query: &str) -> Vec<&'a Feature> {
    let query = PlaceQuery::new(query);
    records
        .iter()
        .filter(|e| e.magnitude() >= min_magnitude)
        .filter(|e| query.matches(e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_feature;

    fn sample() -> Vec<Feature> {
        vec![
            test_feature("1", Some(6.2), "Tokyo"),
            test_feature("2", Some(3.1), "Reno"),
            test_feature("3", None, "10 km N of Reno, Nevada"),
            test_feature("4", Some(4.0), "Off the coast of Tokyo, Japan"),
        ]
    }

    fn ids(events: &[&Feature]) -> Vec<String> {
        events.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_magnitude_threshold() {
        let records = vec![
            test_feature("1", Some(6.2), "Tokyo"),
            test_feature("2", Some(3.1), "Reno"),
        ];
        let result = filter_events(&records, 4.0, "");
        assert_eq!(ids(&result), vec!["1"]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let records = sample();
        assert_eq!(ids(&filter_events(&records, 4.0, "")), vec!["1", "4"]);
    }

    #[test]
    fn test_missing_magnitude_counts_as_zero() {
        let records = sample();
        assert_eq!(ids(&filter_events(&records, 0.0, "")), vec!["1", "2", "3", "4"]);
        assert_eq!(ids(&filter_events(&records, 0.1, "")), vec!["1", "2", "4"]);
    }

    #[test]
    fn test_query_case_insensitive_and_trimmed() {
        let records = sample();
        assert_eq!(ids(&filter_events(&records, 0.0, "  TOKYO ")), vec!["1", "4"]);
        assert_eq!(ids(&filter_events(&records, 0.0, "reno")), vec!["2", "3"]);
        assert!(filter_events(&records, 0.0, "lima").is_empty());
    }

    #[test]
    fn test_whitespace_query_matches_everything() {
        let records = sample();
        assert_eq!(filter_events(&records, 0.0, "   ").len(), records.len());
    }

    #[test]
    fn test_missing_place_only_matches_empty_query() {
        let mut records = sample();
        records[1].properties.place = None;
        assert_eq!(ids(&filter_events(&records, 0.0, "reno")), vec!["3"]);
        assert_eq!(filter_events(&records, 0.0, "").len(), 4);
    }

    #[test]
    fn test_combined_criteria_keep_order() {
        let records = sample();
        let result = filter_events(&records, 3.0, "o");
        assert_eq!(ids(&result), vec!["1", "2", "4"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let records = sample();
        for (min, query) in [(0.0, ""), (3.5, "tokyo"), (0.0, "RENO"), (9.0, "")] {
            let once: Vec<Feature> = filter_events(&records, min, query)
                .into_iter()
                .cloned()
                .collect();
            let twice = filter_events(&once, min, query);
            assert_eq!(ids(&twice), once.iter().map(|e| e.id.clone()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_criteria_apply() {
        let records = sample();
        let criteria = FilterCriteria {
            min_magnitude: 3.0,
            query: "reno".into(),
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&criteria.apply(&records)), vec!["2"]);
    }

    #[test]
    fn test_default_criteria() {
        let criteria = FilterCriteria::default();
        assert_eq!(criteria.window, TimeWindow::Day);
        assert!(criteria.min_magnitude.abs() < f64::EPSILON);
        assert!(criteria.query.is_empty());
    }
}
