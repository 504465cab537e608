//! Telemetry CSV and price JSON import.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::adapters;
use crate::engine::reconcile::ChannelSet;
use crate::engine::series::{PowerSample, TimeSeries};
use crate::engine::tariff::PriceTable;
use crate::engine::types::Channel;
use crate::error::Result;

/// One telemetry row: `timestamp,channel,watts`, already in canonical signs.
#[derive(Debug, Deserialize)]
struct TelemetryRecord {
    timestamp: DateTime<Utc>,
    channel: Channel,
    watts: f64,
}

/// Reads long-format telemetry CSV into per-channel series.
///
/// Rows may appear in any order; on duplicate timestamps within a channel the later
/// row wins.
///
/// # Errors
///
/// Returns a CSV error on malformed rows, unknown channel names, or unparseable
/// timestamps.
pub fn read_telemetry_csv(reader: impl Read) -> Result<ChannelSet> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut raw: BTreeMap<Channel, Vec<PowerSample>> = BTreeMap::new();
    for record in rdr.deserialize::<TelemetryRecord>() {
        let r = record?;
        raw.entry(r.channel)
            .or_default()
            .push(PowerSample::new(r.timestamp, r.watts));
    }

    let mut channels = ChannelSet::new();
    for (channel, samples) in raw {
        debug!(%channel, samples = samples.len(), "imported telemetry");
        channels.insert(channel, TimeSeries::from_unsorted(samples));
    }
    Ok(channels)
}

/// Reads telemetry CSV from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed.
pub fn import_telemetry(path: &Path) -> Result<ChannelSet> {
    let file = File::open(path)?;
    read_telemetry_csv(io::BufReader::new(file))
}

/// Reads a price document.
///
/// Accepts the supplier `priceInfo` object (`current`/`today`/`tomorrow`/`range`) or a
/// day-ahead array of `{SEK_per_kWh, time_start}` nodes, which is taken as today's list.
///
/// # Errors
///
/// Returns an error if the file cannot be read or matches neither shape.
pub fn import_prices(path: &Path) -> Result<PriceTable> {
    let content = fs::read_to_string(path)?;
    parse_prices(&content)
}

/// Parses a price document; see [`import_prices`].
///
/// # Errors
///
/// Returns the JSON error of the supplier shape if neither shape matches.
pub fn parse_prices(content: &str) -> Result<PriceTable> {
    if content.trim_start().starts_with('[') {
        let today = adapters::price_nodes_from_elpriset_json(content)?;
        return Ok(PriceTable {
            today,
            ..PriceTable::default()
        });
    }
    Ok(adapters::price_table_from_tibber_json(content)?)
}
