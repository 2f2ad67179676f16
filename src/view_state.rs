//! Filter criteria <-> URL query string.
//!
//! Reading is lenient: a parameter that fails validation is skipped and the
//! default stays in place, so a hand-edited or truncated link still opens
//! the dashboard. Writing only touches `feed`, `q` and `mag` and leaves any
//! other parameters where they were.

use tracing::debug;
use url::form_urlencoded;

use crate::client::TimeWindow;
use crate::filters::FilterCriteria;

/// Time window parameter.
pub const PARAM_FEED: &str = "feed";
/// Place search parameter.
pub const PARAM_QUERY: &str = "q";
/// Minimum magnitude parameter.
pub const PARAM_MAG: &str = "mag";

/// Ordered query parameters with `URLSearchParams`-style editing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parse a query string, with or without the leading `?`.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self(
            form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first `key` in place and drop the rest, or append.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.0[pos].1 = value;
                let mut index = 0;
                self.0.retain(|(k, _)| {
                    let keep = index <= pos || k != key;
                    index += 1;
                    keep
                });
            }
            None => self.0.push((key.to_string(), value)),
        }
    }

    /// Remove every occurrence of `key`.
    pub fn delete(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    /// Encode as `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl FilterCriteria {
    /// Build criteria from a page query string, falling back to defaults.
    #[must_use]
    pub fn from_query_string(query: &str) -> Self {
        let mut criteria = Self::default();
        criteria.apply_params(&QueryParams::parse(query));
        criteria
    }

    /// Apply every valid parameter in `params`; invalid ones are skipped.
    pub fn apply_params(&mut self, params: &QueryParams) {
        if let Some(feed) = params.get(PARAM_FEED) {
            match feed.parse::<TimeWindow>() {
                Ok(window) => self.window = window,
                Err(e) => debug!("ignoring feed parameter: {e}"),
            }
        }

        if let Some(query) = params.get(PARAM_QUERY).filter(|q| !q.is_empty()) {
            self.query = query.to_string();
        }

        if let Some(mag) = params.get(PARAM_MAG) {
            match parse_magnitude(mag) {
                Some(min) => self.min_magnitude = min,
                None => debug!("ignoring mag parameter {mag:?}"),
            }
        }
    }

    /// Write the criteria into `params`.
    ///
    /// `feed` and `mag` are always present; `q` only when non-empty.
    pub fn write_params(&self, params: &mut QueryParams) {
        params.set(PARAM_FEED, self.window.as_str());
        if self.query.is_empty() {
            params.delete(PARAM_QUERY);
        } else {
            params.set(PARAM_QUERY, self.query.as_str());
        }
        params.set(PARAM_MAG, self.min_magnitude.to_string());
    }

    /// Encode only the criteria as a query string.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut params = QueryParams::default();
        self.write_params(&mut params);
        params.encode()
    }
}

/// Rewrite `current_query` to reflect `criteria` and return `path?query`.
///
/// The result is meant for `history.replaceState` / `HX-Replace-Url`, so
/// applying it never adds a history entry.
#[must_use]
pub fn replace_url(path: &str, current_query: &str, criteria: &FilterCriteria) -> String {
    let mut params = QueryParams::parse(current_query);
    criteria.write_params(&mut params);
    format!("{path}?{}", params.encode())
}

/// Split a full or relative URL into path and query.
#[must_use]
pub fn split_url(url: &str) -> (&str, &str) {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let (before_query, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    // Drop scheme and authority from absolute URLs
    let path = match before_query.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
        None if before_query.is_empty() => "/",
        None => before_query,
    };
    (path, query)
}

fn parse_magnitude(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|m| m.is_finite())
}
