//! Data models for USGS earthquake feeds.
//!
//! These structures match the GeoJSON summary format. Only `id`, the
//! coordinates and `time` are required; everything else is optional so a
//! sparse record still makes it onto the map.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::QuakeviewError;

/// Top-level GeoJSON response from USGS feeds.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    /// Always "FeatureCollection"
    #[serde(rename = "type")]
    pub type_: String,

    /// Feed metadata
    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Earthquake events
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Parse a feed document from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the document is not a
    /// feature collection.
    pub fn from_json(json: &str) -> Result<Self, QuakeviewError> {
        let feed: Self = serde_json::from_str(json)?;
        feed.into_validated()
    }

    /// Validate the collection and normalize its records.
    ///
    /// Records that fail [`Feature::validate`] are dropped, as are repeated
    /// ids (the first occurrence wins), so `id` is a unique key afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the document type is not `FeatureCollection`.
    pub fn into_validated(mut self) -> Result<Self, QuakeviewError> {
        if self.type_ != "FeatureCollection" {
            return Err(QuakeviewError::InvalidResponse(format!(
                "expected type 'FeatureCollection', got '{}'",
                self.type_
            )));
        }

        let mut seen = HashSet::with_capacity(self.features.len());
        self.features.retain(|feature| {
            if let Err(e) = feature.validate() {
                warn!("dropping record: {e}");
                return false;
            }
            if !seen.insert(feature.id.clone()) {
                warn!("dropping duplicate record {}", feature.id);
                return false;
            }
            true
        });

        Ok(self)
    }
}

/// Metadata about the feed response.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// Number of events in response
    #[serde(default)]
    pub count: usize,
}

/// A single earthquake event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Feature {
    /// Unique event ID (stable across refreshes)
    pub id: String,

    /// Geographic location
    pub geometry: Geometry,

    /// Event properties
    pub properties: Properties,
}

impl Feature {
    /// Validate the event structure.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id or a point without latitude.
    pub fn validate(&self) -> Result<(), QuakeviewError> {
        if self.id.is_empty() {
            return Err(QuakeviewError::Validation("empty event ID".into()));
        }
        if self.geometry.coordinates.len() < 2 {
            return Err(QuakeviewError::Validation(format!(
                "event {} has {} coordinates, need at least 2",
                self.id,
                self.geometry.coordinates.len()
            )));
        }
        Ok(())
    }

    /// Magnitude, with a missing value counted as 0.
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.properties.mag.unwrap_or(0.0)
    }

    /// Place description, empty when the feed omits it.
    #[must_use]
    pub fn place(&self) -> &str {
        self.properties.place.as_deref().unwrap_or_default()
    }

    /// Get the event time as a `DateTime<Utc>`.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.properties.time).single()
    }

    /// Get longitude (degrees).
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.geometry.coordinates.first().copied().unwrap_or(0.0)
    }

    /// Get latitude (degrees).
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.geometry.coordinates.get(1).copied().unwrap_or(0.0)
    }

    /// Get depth in kilometers (positive down).
    #[must_use]
    pub fn depth_km(&self) -> f64 {
        self.geometry.coordinates.get(2).copied().unwrap_or(0.0)
    }
}

/// Geographic geometry for an event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Geometry {
    /// Coordinates: [longitude, latitude, depth_km]
    pub coordinates: Vec<f64>,
}

/// Event properties from the USGS feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Properties {
    /// Magnitude value
    #[serde(default)]
    pub mag: Option<f64>,

    /// Magnitude type (mb, ml, mw, etc.)
    #[serde(rename = "magType", default)]
    pub mag_type: Option<String>,

    /// Human-readable place description
    #[serde(default)]
    pub place: Option<String>,

    /// Event time (ms since epoch)
    pub time: i64,

    /// Event page URL
    #[serde(default)]
    pub url: Option<String>,

    /// PAGER alert level: "green", "yellow", "orange", "red"
    #[serde(default)]
    pub alert: Option<String>,

    /// Tsunami flag: 0 or 1
    #[serde(default)]
    pub tsunami: i32,
}

/// Simplified event for JSON/NDJSON snapshot output.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEvent {
    pub id: String,
    pub time: String,
    pub magnitude: Option<f64>,
    pub magnitude_type: Option<String>,
    pub depth_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub place: Option<String>,
    pub alert: Option<String>,
    pub tsunami: bool,
    pub url: Option<String>,
}

impl From<&Feature> for OutputEvent {
    fn from(f: &Feature) -> Self {
        Self {
            id: f.id.clone(),
            time: f
                .time()
                .map_or_else(|| "unknown".into(), |t| t.to_rfc3339()),
            magnitude: f.properties.mag,
            magnitude_type: f.properties.mag_type.clone(),
            depth_km: f.depth_km(),
            latitude: f.latitude(),
            longitude: f.longitude(),
            place: f.properties.place.clone(),
            alert: f.properties.alert.clone(),
            tsunami: f.properties.tsunami != 0,
            url: f.properties.url.clone(),
        }
    }
}

/// Build a minimal record for tests across modules.
#[cfg(test)]
pub(crate) fn test_feature(id: &str, mag: Option<f64>, place: &str) -> Feature {
    Feature {
        id: id.to_string(),
        geometry: Geometry {
            coordinates: vec![139.69, 35.68, 10.0],
        },
        properties: Properties {
            mag,
            place: Some(place.to_string()),
            time: 1_700_000_000_000,
            ..Properties::default()
        },
    }
}
