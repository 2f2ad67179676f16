//! Leaflet map rendering.
//!
//! The page creates one Leaflet map that survives fragment swaps. Each view
//! render emits a small script that hands the current markers and tile
//! source to it; focusing a record emits a `flyTo`.

use serde::Serialize;

use crate::models::Feature;
use crate::render::{MagnitudeBand, escape_html, format_local_time, format_magnitude};

/// Initial map center (lat, lon).
pub const WORLD_CENTER: (f64, f64) = (20.0, 0.0);
/// Initial zoom level.
pub const WORLD_ZOOM: u8 = 2;
/// Zoom level when flying to a focused record.
pub const FOCUS_ZOOM: u8 = 5;
/// Duration of the focus animation.
pub const FOCUS_DURATION_SECS: f64 = 1.0;
/// Marker radius in pixels per magnitude unit.
const RADIUS_PER_MAGNITUDE: f64 = 2.0;

const LIGHT_TILES: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const DARK_TILES: &str = "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png";
const TILE_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";

/// Map color scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Tile imagery URL template for this theme.
    #[must_use]
    pub const fn tile_url(self) -> &'static str {
        match self {
            Self::Light => LIGHT_TILES,
            Self::Dark => DARK_TILES,
        }
    }

    #[must_use]
    pub const fn is_dark(self) -> bool {
        matches!(self, Self::Dark)
    }

    /// The other theme.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// One circle marker, as handed to the page script.
#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
    pub color: &'static str,
    /// Extra CSS class (`pulse` for high-severity events)
    pub class: &'static str,
    /// Pre-escaped popup HTML
    pub popup: String,
}

impl From<&Feature> for Marker {
    fn from(event: &Feature) -> Self {
        let band = MagnitudeBand::from(event);
        Self {
            id: event.id.clone(),
            lat: event.latitude(),
            lon: event.longitude(),
            radius: event.magnitude() * RADIUS_PER_MAGNITUDE,
            color: band.color(),
            class: if band == MagnitudeBand::High { "pulse" } else { "" },
            popup: popup_html(event),
        }
    }
}

/// Camera move requested by focusing a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraMove {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
    pub duration: f64,
}

/// Where the camera should go for `focus`; `None` leaves it alone.
#[must_use]
pub fn focus_camera(focus: Option<&Feature>) -> Option<CameraMove> {
    focus.map(|event| CameraMove {
        lat: event.latitude(),
        lon: event.longitude(),
        zoom: FOCUS_ZOOM,
        duration: FOCUS_DURATION_SECS,
    })
}

/// Payload for `quakeview.update` in the page script.
#[derive(Debug, Serialize)]
struct MapUpdate<'a> {
    tiles: &'static str,
    attribution: &'static str,
    loading: bool,
    markers: &'a [Marker],
}

/// Popup body: place, magnitude, depth and local time.
fn popup_html(event: &Feature) -> String {
    format!(
        r#"<div class="popup"><h3>{place}</h3><p>Magnitude: {mag}</p><p>Depth: {depth:.1} km</p><p>Time: {time}</p></div>"#,
        place = escape_html(event.place()),
        mag = format_magnitude(event.properties.mag),
        depth = event.depth_km(),
        time = format_local_time(event.time()),
    )
}

/// Legend control body summarizing the three bands.
#[must_use]
pub fn legend_html() -> String {
    let rows: String = MagnitudeBand::ALL
        .iter()
        .map(|band| {
            format!(
                r#"<div class="legend-row"><span class="legend-dot" style="background:{color}"></span> {label}</div>"#,
                color = band.color(),
                label = band.range_label(),
            )
        })
        .collect();
    format!(r#"<div class="legend-title">Magnitude</div>{rows}"#)
}

/// Script that pushes `events` onto the page's map.
#[must_use]
pub fn render_map(events: &[&Feature], theme: Theme, loading: bool) -> String {
    let markers: Vec<Marker> = events.iter().map(|e| Marker::from(*e)).collect();
    let update = MapUpdate {
        tiles: theme.tile_url(),
        attribution: TILE_ATTRIBUTION,
        loading,
        markers: &markers,
    };
    format!("<script>quakeview.update({});</script>", script_json(&update))
}

/// Script that flies the map to `focus`, or nothing for no focus.
#[must_use]
pub fn render_focus(focus: Option<&Feature>) -> String {
    focus_camera(focus)
        .map(|camera| format!("<script>quakeview.focus({});</script>", script_json(&camera)))
        .unwrap_or_default()
}

/// Initial camera for the page's map constructor.
#[must_use]
pub fn initial_camera() -> CameraMove {
    CameraMove {
        lat: WORLD_CENTER.0,
        lon: WORLD_CENTER.1,
        zoom: WORLD_ZOOM,
        duration: 0.0,
    }
}

/// JSON safe to inline in a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> String {
    // Serializing these plain structs cannot fail
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".into())
        .replace("</", "<\\/")
}
