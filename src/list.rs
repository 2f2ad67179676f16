//! Sidebar list of recent earthquakes.

use url::form_urlencoded;

use crate::models::Feature;
use crate::render::{MagnitudeBand, escape_html, format_local_time, format_magnitude};

/// Maximum number of entries shown.
pub const LIST_LIMIT: usize = 20;
/// Skeleton entries shown for an empty set.
pub const PLACEHOLDER_COUNT: usize = 8;

/// One clickable list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub id: String,
    pub place: String,
    pub time: String,
    pub magnitude: String,
    pub band: MagnitudeBand,
}

impl From<&Feature> for ListEntry {
    fn from(event: &Feature) -> Self {
        Self {
            id: event.id.clone(),
            place: event.place().to_string(),
            time: format_local_time(event.time()),
            magnitude: format_magnitude(event.properties.mag),
            band: MagnitudeBand::from(event),
        }
    }
}

impl ListEntry {
    /// Path that focuses the map on this entry.
    #[must_use]
    pub fn focus_path(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("id", &self.id)
            .finish();
        format!("/focus?{query}")
    }

    fn to_html(&self) -> String {
        format!(
            r##"<li class="quake-item" hx-get="{focus}" hx-target="#focus" hx-swap="innerHTML">
  <p class="quake-place">{place}</p>
  <div class="quake-meta">
    <span class="quake-time">{time}</span>
    <span class="quake-mag">Mag: <span class="badge {band}">{mag}</span></span>
  </div>
</li>"##,
            focus = escape_html(&self.focus_path()),
            place = escape_html(&self.place),
            time = escape_html(&self.time),
            band = self.band.css_class(),
            mag = escape_html(&self.magnitude),
        )
    }
}

/// Entries for the first [`LIST_LIMIT`] events, in order.
#[must_use]
pub fn list_entries(events: &[&Feature]) -> Vec<ListEntry> {
    events
        .iter()
        .take(LIST_LIMIT)
        .map(|e| ListEntry::from(*e))
        .collect()
}

/// Render the sidebar list, or skeleton rows when `events` is empty.
#[must_use]
pub fn render_list(events: &[&Feature]) -> String {
    let items: String = if events.is_empty() {
        placeholder_html().repeat(PLACEHOLDER_COUNT)
    } else {
        list_entries(events)
            .iter()
            .map(ListEntry::to_html)
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(r#"<ul class="quake-list">{items}</ul>"#)
}

fn placeholder_html() -> &'static str {
    r#"<li class="quake-item skeleton"><div class="bar w-3-4"></div><div class="bar w-1-2"></div><div class="bar w-2-3"></div></li>"#
}
