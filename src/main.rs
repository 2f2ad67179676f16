//! quakeview - Live earthquake map dashboard.
//!
//! Serves a Leaflet map and list of recent USGS earthquakes, filterable by
//! magnitude and place, with the filters kept in the page URL so a view can
//! be shared as a link.

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

mod cli;
mod client;
mod errors;
mod filters;
mod list;
mod map;
mod models;
mod output;
mod refresh;
mod render;
mod server;
mod view_state;

use cli::{Cli, Command};
use client::UsgsClient;
use filters::filter_events;
use map::Theme;

/// Shortest refresh interval accepted from the command line.
const MIN_REFRESH_SECS: u64 = 30;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Snapshot(args) => cmd_snapshot(args),
    }
}

/// Initialize tracing subscriber.
///
/// `RUST_LOG` wins over the verbosity flags when set.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the `snapshot` command - one-shot fetch, filter and print.
fn cmd_snapshot(args: cli::SnapshotArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let client = UsgsClient::new().context("failed to create USGS client")?;
    let feed = runtime
        .block_on(client.fetch_feed(args.feed))
        .context("failed to fetch earthquake feed")?;

    let mut events = filter_events(&feed.features, args.min_magnitude, &args.query);
    events.truncate(args.limit);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, &events, args.format)?;

    Ok(())
}

/// Execute the `serve` command - start the dashboard server.
fn cmd_serve(args: cli::ServeArgs) -> Result<()> {
    let refresh_secs = args.refresh_interval.max(MIN_REFRESH_SECS);
    if refresh_secs != args.refresh_interval {
        tracing::warn!("refresh interval clamped to minimum of {MIN_REFRESH_SECS} seconds");
    }

    let config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
        refresh_interval: Duration::from_secs(refresh_secs),
        theme: if args.dark { Theme::Dark } else { Theme::Light },
    };

    let client = UsgsClient::new().context("failed to create USGS client")?;

    // Print startup message
    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🌍 quakeview\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:    \x1b[96m{url}\x1b[0m");
    println!("  Refresh:  {refresh_secs}s");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    // Run the async server on tokio runtime
    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(server::run_server(config, client))
}
