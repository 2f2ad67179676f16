//! Terminal output for the `snapshot` command.
//!
//! Supports human-readable (colored by magnitude band), JSON, and NDJSON.

use std::io::{self, Write};

use crate::models::{Feature, OutputEvent};
use crate::render::{MagnitudeBand, format_local_time, format_magnitude};

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const RED: &str = "\x1b[91m";
const ORANGE: &str = "\x1b[38;5;208m";
const YELLOW: &str = "\x1b[93m";

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON array
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

/// Terminal color matching the map marker band.
fn band_color(band: MagnitudeBand) -> &'static str {
    match band {
        MagnitudeBand::High => RED,
        MagnitudeBand::Medium => ORANGE,
        MagnitudeBand::Low => YELLOW,
    }
}

/// Write events as one colored line each.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, events: &[&Feature]) -> io::Result<()> {
    for event in events {
        let color = band_color(MagnitudeBand::from(*event));
        let mag = format_magnitude(event.properties.mag);
        let depth = event.depth_km();
        let time = format_local_time(event.time());
        let place = match event.place() {
            "" => "Unknown location",
            p => p,
        };

        writeln!(
            writer,
            "{color}{BOLD}M{mag:>4}{RESET} │ {DIM}{depth:>5.0}km{RESET} │ {time} │ {place}"
        )?;
    }
    Ok(())
}

/// Write events as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(writer: &mut W, events: &[&Feature]) -> io::Result<()> {
    let output: Vec<OutputEvent> = events.iter().map(|e| OutputEvent::from(*e)).collect();
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

/// Write events as newline-delimited JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write>(writer: &mut W, events: &[&Feature]) -> io::Result<()> {
    for event in events {
        let json = serde_json::to_string(&OutputEvent::from(*event))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{json}")?;
    }
    Ok(())
}

/// Write events in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(writer: &mut W, events: &[&Feature], format: Format) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, events),
        Format::Json => write_json(writer, events),
        Format::Ndjson => write_ndjson(writer, events),
    }
}
