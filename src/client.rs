//! USGS earthquake feed client.
//!
//! Provides async HTTP access to the three summary feeds the dashboard can
//! show. Uses reqwest with rustls for TLS.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use crate::errors::QuakeviewError;
use crate::models::FeatureCollection;

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("quakeview/", env!("CARGO_PKG_VERSION"));

/// USGS base URL for earthquake feeds.
const USGS_BASE_URL: &str = "https://earthquake.usgs.gov";

/// Lookback period of the feed being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeWindow {
    Hour,
    #[default]
    Day,
    Week,
}

impl TimeWindow {
    /// Every window, in display order.
    pub const ALL: [Self; 3] = [Self::Hour, Self::Day, Self::Week];

    /// Key used in the `feed` URL parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }

    /// Summary feed name for this window.
    #[must_use]
    pub const fn feed_name(self) -> &'static str {
        match self {
            Self::Hour => "all_hour",
            Self::Day => "all_day",
            Self::Week => "all_week",
        }
    }

    /// Short label for the window selector.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hour => "1h",
            Self::Day => "24h",
            Self::Week => "7d",
        }
    }
}

impl std::str::FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            _ => Err(format!("unknown time window: {s} (expected: hour, day, week)")),
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can produce a feed for a time window.
///
/// The refresh loop is generic over this so it can run against a scripted
/// source in tests.
pub trait FeedSource: Send + Sync + 'static {
    /// Fetch the feed for `window`.
    fn fetch(
        &self,
        window: TimeWindow,
    ) -> impl Future<Output = Result<FeatureCollection, QuakeviewError>> + Send;
}

/// Client for the USGS summary feeds.
#[derive(Debug, Clone)]
pub struct UsgsClient {
    client: Client,
    base_url: String,
}

impl UsgsClient {
    /// Create a new USGS client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new() -> Result<Self, QuakeviewError> {
        Self::with_base_url(USGS_BASE_URL)
    }

    /// Create a client that talks to another host serving the same paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, QuakeviewError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of the summary feed for `window`.
    #[must_use]
    pub fn feed_url(&self, window: TimeWindow) -> String {
        format!(
            "{}/earthquakes/feed/v1.0/summary/{}.geojson",
            self.base_url,
            window.feed_name()
        )
    }

    /// Fetch a summary GeoJSON feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or response cannot be parsed.
    #[instrument(skip(self), fields(window = window.as_str()))]
    pub async fn fetch_feed(&self, window: TimeWindow) -> Result<FeatureCollection, QuakeviewError> {
        let url = self.feed_url(window);

        debug!("fetching feed from {}", url);

        let response = self.client.get(&url).send().await?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuakeviewError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        let feed = FeatureCollection::from_json(&body)?;

        if let Some(meta) = &feed.metadata {
            debug!("feed '{}' reports {} events", meta.title, meta.count);
        }
        debug!("fetched {} events", feed.features.len());
        Ok(feed)
    }
}

impl FeedSource for UsgsClient {
    fn fetch(
        &self,
        window: TimeWindow,
    ) -> impl Future<Output = Result<FeatureCollection, QuakeviewError>> + Send {
        self.fetch_feed(window)
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    const HOUR_PATH: &str = "/earthquakes/feed/v1.0/summary/all_hour.geojson";

    /// Serve `router` on an ephemeral local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_time_window_round_trip() {
        for window in TimeWindow::ALL {
            let parsed: TimeWindow = window.as_str().parse().expect("failed to parse");
            assert_eq!(parsed, window);
        }
    }

    #[test]
    fn test_time_window_rejects_unknown() {
        assert!("month".parse::<TimeWindow>().is_err());
        assert!("Day".parse::<TimeWindow>().is_err());
        assert!("".parse::<TimeWindow>().is_err());
    }

    #[test]
    fn test_feed_urls() {
        let client = UsgsClient::new().unwrap();
        assert_eq!(
            client.feed_url(TimeWindow::Hour),
            "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson"
        );
        assert_eq!(
            client.feed_url(TimeWindow::Week),
            "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_week.geojson"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = UsgsClient::with_base_url("http://localhost:9000/").unwrap();
        assert_eq!(
            client.feed_url(TimeWindow::Day),
            "http://localhost:9000/earthquakes/feed/v1.0/summary/all_day.geojson"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let client = UsgsClient::with_base_url("http://127.0.0.1:9").unwrap();
        let result = client.fetch(TimeWindow::Hour).await;
        assert!(matches!(result, Err(QuakeviewError::Http(_))));
    }

    #[tokio::test]
    async fn test_fetch_parses_local_feed() {
        let body = r#"{"type": "FeatureCollection", "features": [
            {"id": "a", "geometry": {"coordinates": [1.0, 2.0, 3.0]},
             "properties": {"mag": 4.5, "place": "Somewhere", "time": 0}}
        ]}"#;
        let base = serve(Router::new().route(HOUR_PATH, get(move || async move { body }))).await;

        let feed = UsgsClient::with_base_url(base)
            .unwrap()
            .fetch(TimeWindow::Hour)
            .await
            .unwrap();
        assert_eq!(feed.features.len(), 1);
        assert_eq!(feed.features[0].place(), "Somewhere");
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let router = Router::new().route(
            HOUR_PATH,
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let client = UsgsClient::with_base_url(serve(router).await).unwrap();

        let err = client.fetch(TimeWindow::Hour).await.unwrap_err();
        assert!(
            matches!(&err, QuakeviewError::Api { status: 503, message } if message == "maintenance"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_missing_feed_is_api_error() {
        let client = UsgsClient::with_base_url(serve(Router::new()).await).unwrap();
        let err = client.fetch(TimeWindow::Week).await.unwrap_err();
        assert!(matches!(err, QuakeviewError::Api { status: 404, .. }), "{err}");
    }

    #[tokio::test]
    async fn test_wrong_document_type_is_invalid_response() {
        let router = Router::new().route(
            HOUR_PATH,
            get(|| async { r#"{"type": "Feature", "features": []}"# }),
        );
        let client = UsgsClient::with_base_url(serve(router).await).unwrap();

        let err = client.fetch(TimeWindow::Hour).await.unwrap_err();
        assert!(matches!(err, QuakeviewError::InvalidResponse(_)), "{err}");
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let router = Router::new().route(HOUR_PATH, get(|| async { "<html>oops</html>" }));
        let client = UsgsClient::with_base_url(serve(router).await).unwrap();

        let err = client.fetch(TimeWindow::Hour).await.unwrap_err();
        assert!(matches!(err, QuakeviewError::Parse(_)), "{err}");
    }
}
