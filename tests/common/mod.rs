//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use energy_ledger::config::EngineConfig;
use energy_ledger::engine::pipeline::Engine;
use energy_ledger::engine::reconcile::ChannelSet;
use energy_ledger::engine::series::TimeSeries;
use energy_ledger::engine::tariff::PriceTable;
use energy_ledger::engine::types::{Channel, PriceNode};
use energy_ledger::sources::{MemoryPrices, MemoryTelemetry};

/// `2024-06-01T{h}:{m}:00Z`.
pub fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
}

/// Default configuration with UTC wall-clock boundaries.
pub fn utc_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.aggregation.timezone = "UTC".to_string();
    config
}

/// `minutes` per-minute readings of constant power on every channel, from `start`.
///
/// Values are `(solar, load, grid, battery)` in canonical signs.
pub fn constant_channels(
    start: DateTime<Utc>,
    minutes: usize,
    (solar, load, grid, battery): (f64, f64, f64, f64),
) -> ChannelSet {
    let series = |w: f64| TimeSeries::from_values(start, Duration::minutes(1), &vec![w; minutes]);
    ChannelSet::new()
        .with(Channel::Solar, series(solar))
        .with(Channel::Load, series(load))
        .with(Channel::GridNet, series(grid))
        .with(Channel::BatteryNet, series(battery))
}

/// One node per UTC hour of 2024-06-01, skipping the hours in `missing`.
pub fn flat_prices(total: f64, energy: f64, missing: &[u32]) -> PriceTable {
    let today = (0..24)
        .filter(|h| !missing.contains(h))
        .map(|h| PriceNode {
            starts_at: t(h, 0),
            total_per_kwh: total,
            energy_per_kwh: energy,
            tax_per_kwh: total - energy,
        })
        .collect();
    PriceTable {
        today,
        ..PriceTable::default()
    }
}

/// Engine over in-memory sources.
pub fn engine(
    config: EngineConfig,
    channels: ChannelSet,
    prices: PriceTable,
) -> Engine<MemoryTelemetry, MemoryPrices> {
    Engine::new(
        config,
        MemoryTelemetry::new(channels),
        MemoryPrices::new(prices),
    )
    .unwrap()
}
