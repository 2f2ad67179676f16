//! Web server for the quakeview dashboard.
//!
//! Provides the map dashboard using:
//! - Axum for HTTP server
//! - SSE (Server-Sent Events) to tell open pages a refresh landed
//! - HTMX to re-render the list and map data without page reloads
//! - Leaflet for the map itself
//!
//! Every view request carries the full filter criteria, so the server keeps
//! no per-page state beyond the shared refresh loop.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{
        Html, IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use minijinja::{Environment, context};
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::client::{FeedSource, TimeWindow};
use crate::filters::FilterCriteria;
use crate::list::render_list;
use crate::map::{self, Theme};
use crate::refresh::{DEFAULT_REFRESH_INTERVAL, DashboardState, RefreshPool};
use crate::render::escape_html;
use crate::view_state::{QueryParams, replace_url, split_url};

/// Query parameter carrying the theme (not mirrored into the page URL).
const PARAM_THEME: &str = "theme";

/// Header HTMX sends with the page's current URL.
const HX_CURRENT_URL: &str = "hx-current-url";

/// Response header telling HTMX to `replaceState` the page URL.
const HX_REPLACE_URL: &str = "hx-replace-url";

/// Name of the full-page template.
const INDEX_TEMPLATE: &str = "index.html";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub refresh_interval: Duration,
    /// Theme used when a request does not name one
    pub theme: Theme,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            theme: Theme::default(),
        }
    }
}

/// Shared application state.
pub struct AppState<S: FeedSource> {
    /// One refresh loop per time window
    refresh: Arc<RefreshPool<S>>,
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Page templates
    pages: Arc<Environment<'static>>,
}

impl<S: FeedSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            refresh: Arc::clone(&self.refresh),
            config: Arc::clone(&self.config),
            pages: Arc::clone(&self.pages),
        }
    }
}

impl<S: FeedSource> AppState<S> {
    /// # Errors
    ///
    /// Returns an error if the page template does not compile.
    pub fn new(refresh: Arc<RefreshPool<S>>, config: ServerConfig) -> Result<Self, minijinja::Error> {
        Ok(Self {
            refresh,
            config: Arc::new(config),
            pages: Arc::new(page_environment()?),
        })
    }

    /// Criteria and theme from a raw request query.
    fn read_request(&self, query: &str) -> (FilterCriteria, Theme) {
        let criteria = FilterCriteria::from_query_string(query);
        let theme = match QueryParams::parse(query).get(PARAM_THEME) {
            Some("dark") => Theme::Dark,
            Some("light") => Theme::Light,
            _ => self.config.theme,
        };
        (criteria, theme)
    }
}

/// Create the Axum router with all routes.
pub fn create_router<S: FeedSource>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(index_handler::<S>))
        .route("/view", get(view_handler::<S>))
        .route("/focus", get(focus_handler::<S>))
        .route("/stream", get(sse_handler::<S>))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the web server and refresh loop; returns on Ctrl+C.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server<S: FeedSource>(config: ServerConfig, source: S) -> anyhow::Result<()> {
    let refresh = Arc::new(RefreshPool::new(source, config.refresh_interval));
    refresh.ensure(TimeWindow::default());

    let addr = format!("{}:{}", config.host, config.port);
    let app = create_router(AppState::new(Arc::clone(&refresh), config)?);

    tracing::info!("quakeview dashboard starting at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh.stop();
    tracing::info!("dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// The pieces of one dashboard render.
#[derive(Debug, Clone)]
pub struct ViewParts {
    pub list: String,
    pub banner: String,
    pub summary: String,
    pub map_script: String,
}

impl ViewParts {
    /// Render the dashboard for `criteria` against the current state.
    ///
    /// If `state` holds another window's records, they stay listed under
    /// their own window's label and the map shows its loading state.
    #[must_use]
    pub fn build(criteria: &FilterCriteria, theme: Theme, state: &DashboardState) -> Self {
        let events = criteria.apply(&state.records);
        let loading = state.is_loading() || state.window != criteria.window;

        let banner = state
            .error
            .as_deref()
            .map(|msg| format!(r#"<div class="error-banner" role="alert">{}</div>"#, escape_html(msg)))
            .unwrap_or_default();

        let updated = state.last_updated.map_or_else(
            || "waiting for data".to_string(),
            |t| format!("updated {}", t.with_timezone(&chrono::Local).format("%H:%M:%S")),
        );
        let summary = format!(
            "{shown} of {total} earthquakes · {window} · {updated}",
            shown = events.len(),
            total = state.records.len(),
            window = state.window.label(),
        );

        Self {
            list: render_list(&events),
            banner,
            summary,
            map_script: map::render_map(&events, theme, loading),
        }
    }

    /// HTMX swap body: list for the target, banner and summary out of band.
    #[must_use]
    pub fn fragment(&self) -> String {
        format!(
            r#"{list}
<div id="banner" hx-swap-oob="true">{banner}</div>
<div id="summary" hx-swap-oob="true">{summary}</div>
{map_script}"#,
            list = self.list,
            banner = self.banner,
            summary = self.summary,
            map_script = self.map_script,
        )
    }
}

fn window_buttons(selected: TimeWindow) -> String {
    TimeWindow::ALL
        .iter()
        .map(|w| {
            format!(
                r#"<label class="window-btn"><input type="radio" name="feed" value="{value}"{checked}><span>{label}</span></label>"#,
                value = w.as_str(),
                checked = if *w == selected { " checked" } else { "" },
                label = w.label(),
            )
        })
        .collect()
}

/// Compile the page templates.
fn page_environment() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(INDEX_TEMPLATE, INDEX_HTML)?;
    Ok(env)
}

/// Full page for the initial load.
///
/// # Errors
///
/// Returns an error if the page template fails to render.
pub fn render_page(
    pages: &Environment<'_>,
    criteria: &FilterCriteria,
    theme: Theme,
    parts: &ViewParts,
    url: &str,
) -> Result<String, minijinja::Error> {
    pages.get_template(INDEX_TEMPLATE)?.render(context! {
        theme_class => if theme.is_dark() { "dark" } else { "" },
        theme => if theme.is_dark() { "dark" } else { "light" },
        theme_toggle => theme_toggle_label(theme),
        window_buttons => window_buttons(criteria.window),
        query => &criteria.query,
        mag => criteria.min_magnitude.to_string(),
        banner => &parts.banner,
        summary => &parts.summary,
        list => &parts.list,
        legend => map::legend_html(),
        camera => map::initial_camera(),
        map_script => &parts.map_script,
        replace_url => url,
    })
}

fn theme_toggle_label(theme: Theme) -> &'static str {
    match theme.toggled() {
        Theme::Dark => "🌙 Dark Mode",
        Theme::Light => "☀️ Light Mode",
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Main page handler: criteria come from the page URL.
async fn index_handler<S: FeedSource>(
    State(state): State<AppState<S>>,
    RawQuery(query): RawQuery,
) -> Result<Html<String>, (StatusCode, &'static str)> {
    let query = query.unwrap_or_default();
    let (criteria, theme) = state.read_request(&query);

    let snapshot = state.refresh.snapshot(criteria.window);
    let parts = ViewParts::build(&criteria, theme, &snapshot);
    let url = replace_url("/", &query, &criteria);
    render_page(&state.pages, &criteria, theme, &parts, &url)
        .map(Html)
        .map_err(|e| {
            tracing::error!("failed to render page: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page")
        })
}

/// View fragment handler: called on every control change and refresh.
async fn view_handler<S: FeedSource>(
    State(state): State<AppState<S>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (criteria, theme) = state.read_request(query.as_deref().unwrap_or_default());
    tracing::debug!("rendering view {}", criteria.to_query_string());

    let snapshot = state.refresh.snapshot(criteria.window);
    let parts = ViewParts::build(&criteria, theme, &snapshot);

    let current = headers
        .get(HX_CURRENT_URL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/");
    let (path, current_query) = split_url(current);
    let url = replace_url(path, current_query, &criteria);

    ([(HX_REPLACE_URL, url)], Html(parts.fragment()))
}

#[derive(Debug, Deserialize)]
struct FocusParams {
    #[serde(default)]
    id: String,
}

/// Focus handler: fly to a record still present in the current set.
async fn focus_handler<S: FeedSource>(
    State(state): State<AppState<S>>,
    Query(params): Query<FocusParams>,
) -> Html<String> {
    let focus = state.refresh.find(&params.id);
    if focus.is_none() {
        tracing::debug!("focus target {} no longer in feed", params.id);
    }
    Html(map::render_focus(focus.as_ref()))
}

/// SSE stream handler: one `refresh` event per applied fetch, carrying the
/// window it belongs to.
async fn sse_handler<S: FeedSource>(
    State(state): State<AppState<S>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.refresh.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(refreshed) => Some(Ok(Event::default()
            .event("refresh")
            .data(refreshed.window.as_str()))),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Earthquake Visualizer</title>

    <!-- HTMX + SSE -->
    <script src="https://unpkg.com/htmx.org@1.9.10"></script>
    <script src="https://unpkg.com/htmx.org@1.9.10/dist/ext/sse.js"></script>

    <!-- Leaflet -->
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>

    <style>
        :root {
            --bg: #f9fafb; --panel: #ffffff; --text: #111827; --muted: #6b7280;
            --border: rgba(0,0,0,0.06); --skeleton: #e5e7eb;
        }
        .dark {
            --bg: #030712; --panel: #111827; --text: #f9fafb; --muted: #9ca3af;
            --border: rgba(255,255,255,0.1); --skeleton: #374151;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body { font-family: system-ui, sans-serif; background: var(--bg); color: var(--text); }
        .header { position: sticky; top: 0; z-index: 1000; background: var(--panel); border-bottom: 1px solid var(--border); }
        .header-inner { max-width: 1280px; margin: 0 auto; padding: 0.5rem 1rem; display: flex; justify-content: space-between; align-items: center; gap: 1rem; }
        .logo { font-weight: 700; display: flex; gap: 0.5rem; align-items: center; white-space: nowrap; }
        #controls { display: flex; align-items: center; gap: 0.75rem; font-size: 0.875rem; }
        .window-btn input { display: none; }
        .window-btn span { padding: 0.25rem 0.6rem; border-radius: 0.5rem; cursor: pointer; color: var(--muted); }
        .window-btn input:checked + span { background: var(--bg); color: var(--text); box-shadow: 0 1px 2px rgba(0,0,0,0.2); }
        #q { width: 16rem; padding: 0.45rem 0.75rem; border-radius: 0.5rem; border: 1px solid var(--border); background: var(--panel); color: var(--text); }
        .theme-toggle { padding: 0.45rem 0.9rem; border-radius: 0.5rem; border: none; cursor: pointer; background: #facc15; }
        .dark .theme-toggle { background: #374151; color: #fff; }
        .main { max-width: 1280px; margin: 0 auto; padding: 1.25rem 1rem; display: flex; gap: 1.25rem; }
        .sidebar { width: 24rem; height: 85vh; overflow-y: auto; background: var(--panel); border: 1px solid var(--border); border-radius: 1rem; padding: 1rem; }
        .sidebar h2 { font-size: 1.1rem; margin-bottom: 0.25rem; }
        #summary { font-size: 0.75rem; color: var(--muted); margin-bottom: 0.75rem; }
        .quake-list { list-style: none; display: flex; flex-direction: column; gap: 0.5rem; }
        .quake-item { padding: 0.75rem; border-radius: 0.75rem; border: 1px solid var(--border); cursor: pointer; font-size: 0.875rem; }
        .quake-item:hover { border-color: rgba(52,211,153,0.6); }
        .quake-place { font-weight: 600; }
        .quake-meta { display: flex; justify-content: space-between; margin-top: 0.25rem; font-size: 0.75rem; color: var(--muted); }
        .badge { padding: 0.1rem 0.5rem; border-radius: 0.375rem; font-weight: 700; }
        .band-high { background: rgba(239,68,68,0.1); color: #dc2626; }
        .band-medium { background: rgba(251,146,60,0.1); color: #f97316; }
        .band-low { background: rgba(250,204,21,0.1); color: #ca8a04; }
        .skeleton { cursor: default; animation: pulse-bg 1.5s infinite; }
        .skeleton .bar { height: 0.6rem; border-radius: 0.25rem; background: var(--skeleton); margin-bottom: 0.4rem; }
        .w-3-4 { width: 75%; } .w-1-2 { width: 50%; } .w-2-3 { width: 66%; }
        .map-column { flex: 1; }
        .error-banner { margin-bottom: 0.75rem; padding: 0.75rem; border-radius: 0.5rem; background: #fef2f2; border: 1px solid #fecaca; color: #b91c1c; font-size: 0.875rem; }
        #map { height: 85vh; width: 100%; border-radius: 1rem; }
        #map.loading { animation: pulse-bg 1.5s infinite; background: var(--skeleton); }
        #map.loading .leaflet-pane { visibility: hidden; }
        .legend { background: var(--panel); color: var(--text); padding: 0.5rem; border-radius: 0.375rem; font-size: 0.75rem; }
        .legend-title { font-weight: 600; margin-bottom: 0.25rem; }
        .legend-dot { display: inline-block; width: 0.5rem; height: 0.5rem; border-radius: 50%; }
        .pulse { animation: pulse-marker 1.5s infinite; }
        @keyframes pulse-bg { 50% { opacity: 0.5; } }
        @keyframes pulse-marker { 50% { stroke-width: 8; stroke-opacity: 0.3; } }
    </style>
</head>
<body class="{{ theme_class }}">
    <header class="header">
        <div class="header-inner">
            <div class="logo">🌍 <span>Earthquake Visualizer</span></div>
            <form id="controls" hx-get="/view" hx-target="#view" hx-swap="innerHTML"
                  hx-trigger="change, input from:#q, input from:#mag">
                <div class="windows">{{ window_buttons|safe }}</div>
                <input id="q" type="search" name="q" value="{{ query }}" placeholder="Search place..." autocomplete="off">
                <label>Min Mag
                    <input id="mag" type="range" name="mag" min="0" max="8" step="0.5" value="{{ mag }}"
                           oninput="document.getElementById('mag-value').textContent = this.value">
                    <span id="mag-value">{{ mag }}</span>
                </label>
                <input id="theme" type="hidden" name="theme" value="{{ theme }}">
                <button type="button" class="theme-toggle" onclick="quakeview.toggleTheme()">{{ theme_toggle }}</button>
            </form>
        </div>
    </header>

    <main class="main" hx-ext="sse" sse-connect="/stream">
        <aside class="sidebar">
            <h2>Recent Earthquakes</h2>
            <div id="summary">{{ summary }}</div>
            <div id="view" hx-get="/view" hx-include="#controls" hx-trigger="sse:refresh" hx-swap="innerHTML">
                {{ list|safe }}
            </div>
        </aside>
        <section class="map-column">
            <div id="banner">{{ banner|safe }}</div>
            <div id="map"></div>
            <div id="focus" hidden></div>
        </section>
    </main>

    <script>
        const quakeview = (function () {
            const camera = {{ camera|tojson }};
            const el = document.getElementById('map');
            const map = L.map('map').setView([camera.lat, camera.lon], camera.zoom);
            const markers = L.layerGroup().addTo(map);
            let tiles = null;
            let tileUrl = null;

            L.control.scale({ position: 'bottomleft' }).addTo(map);
            const legend = L.control({ position: 'bottomright' });
            legend.onAdd = function () {
                const div = L.DomUtil.create('div', 'legend');
                div.innerHTML = {{ legend|tojson }};
                return div;
            };
            legend.addTo(map);

            function update(data) {
                if (data.tiles !== tileUrl) {
                    if (tiles) tiles.remove();
                    tiles = L.tileLayer(data.tiles, { attribution: data.attribution }).addTo(map);
                    tileUrl = data.tiles;
                }
                el.classList.toggle('loading', data.loading);
                markers.clearLayers();
                for (const m of data.markers) {
                    L.circleMarker([m.lat, m.lon], {
                        radius: m.radius,
                        color: m.color,
                        fillOpacity: 0.6,
                        className: m.class
                    }).bindPopup(m.popup).addTo(markers);
                }
            }

            function focus(c) {
                map.flyTo([c.lat, c.lon], c.zoom, { duration: c.duration });
            }

            function toggleTheme() {
                const input = document.getElementById('theme');
                const dark = input.value !== 'dark';
                input.value = dark ? 'dark' : 'light';
                document.body.classList.toggle('dark', dark);
                document.querySelector('.theme-toggle').textContent = dark ? '☀️ Light Mode' : '🌙 Dark Mode';
                htmx.trigger('#controls', 'change');
            }

            return { update, focus, toggleTheme };
        })();

        history.replaceState(null, '', {{ replace_url|tojson }});
    </script>
    {{ map_script|safe }}
</body>
</html>
"##;
