//! Error types for quakeview.
//!
//! Uses `thiserror` for library-style error definitions. Every variant is a
//! fetch failure from the dashboard's point of view; the detailed message is
//! logged while the page only ever shows [`FETCH_FAILURE_MESSAGE`].

use thiserror::Error;

/// Banner text shown when a refresh fails.
pub const FETCH_FAILURE_MESSAGE: &str = "Failed to load earthquakes. Please try again.";

/// Errors that can occur while fetching or validating feed data.
#[derive(Error, Debug)]
pub enum QuakeviewError {
    /// Transport failure or undecodable body
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("failed to parse feed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Feed answered with a non-success status
    #[error("USGS feed error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Document is not a GeoJSON feature collection
    #[error("invalid feed document: {0}")]
    InvalidResponse(String),

    /// A single record is unusable
    #[error("invalid event record: {0}")]
    Validation(String),
}

impl QuakeviewError {
    /// Message safe to present to a dashboard user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        FETCH_FAILURE_MESSAGE
    }
}
