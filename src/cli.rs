//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use clap::{Parser, Subcommand};

use crate::client::TimeWindow;
use crate::output::Format;

/// Live earthquake map dashboard.
#[derive(Parser, Debug)]
#[command(name = "quakeview")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the map dashboard
    Serve(ServeArgs),

    /// Print the current filtered feed once and exit
    Snapshot(SnapshotArgs),
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Seconds between feed refreshes (minimum 30)
    #[arg(long, default_value = "60")]
    pub refresh_interval: u64,

    /// Start with dark map tiles
    #[arg(long)]
    pub dark: bool,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

/// Arguments for the `snapshot` command.
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// Time window to fetch: hour, day or week
    #[arg(long, default_value = "day", value_parser = parse_time_window)]
    pub feed: TimeWindow,

    /// Minimum magnitude to show
    #[arg(long, default_value = "0")]
    pub min_magnitude: f64,

    /// Only show events whose place contains this text
    #[arg(long, short = 'q', default_value = "")]
    pub query: String,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Parse a time window from string.
fn parse_time_window(s: &str) -> Result<TimeWindow, String> {
    s.parse()
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["quakeview", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 8080);
        assert_eq!(args.refresh_interval, 60);
        assert!(!args.dark);
    }

    #[test]
    fn test_snapshot_args() {
        let cli = Cli::try_parse_from([
            "quakeview", "--verbose", "snapshot", "--feed", "week", "--min-magnitude", "4.5",
            "-q", "alaska", "-n", "5", "-f", "ndjson",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Snapshot(args) = cli.command else {
            panic!("expected snapshot");
        };
        assert_eq!(args.feed, TimeWindow::Week);
        assert!((args.min_magnitude - 4.5).abs() < f64::EPSILON);
        assert_eq!(args.query, "alaska");
        assert_eq!(args.limit, 5);
        assert_eq!(args.format, Format::Ndjson);
    }

    #[test]
    fn test_snapshot_rejects_unknown_window() {
        assert!(Cli::try_parse_from(["quakeview", "snapshot", "--feed", "month"]).is_err());
    }
}
