//! Helpers shared by the map and list renderers.

use chrono::{DateTime, Local, Utc};

use crate::models::Feature;

/// Severity classification used for marker and badge colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnitudeBand {
    /// mag < 4
    Low,
    /// 4 <= mag < 6
    Medium,
    /// mag >= 6
    High,
}

impl MagnitudeBand {
    /// Every band, most severe first (legend order).
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Classify a magnitude.
    #[must_use]
    pub fn from_magnitude(mag: f64) -> Self {
        match mag {
            m if m >= 6.0 => Self::High,
            m if m >= 4.0 => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Marker stroke color.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::High => "red",
            Self::Medium => "orange",
            Self::Low => "yellow",
        }
    }

    /// CSS modifier class, e.g. `band-high`.
    #[must_use]
    pub const fn css_class(self) -> &'static str {
        match self {
            Self::High => "band-high",
            Self::Medium => "band-medium",
            Self::Low => "band-low",
        }
    }

    /// Legend text for the band's range.
    #[must_use]
    pub const fn range_label(self) -> &'static str {
        match self {
            Self::High => "≥ 6",
            Self::Medium => "4–5.9",
            Self::Low => "< 4",
        }
    }
}

impl From<&Feature> for MagnitudeBand {
    fn from(event: &Feature) -> Self {
        Self::from_magnitude(event.magnitude())
    }
}

/// Escape text for use in HTML content and quoted attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Event time in the server's local zone, or "Unknown time".
#[must_use]
pub fn format_local_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "Unknown time".to_string(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Magnitude as shown on badges and popups; `?` when the feed has none.
#[must_use]
pub fn format_magnitude(mag: Option<f64>) -> String {
    mag.map_or_else(|| "?".into(), |m| format!("{m:.1}"))
}
