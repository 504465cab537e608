//! Collaborator contracts for telemetry and prices, with in-memory implementations.

use chrono::{DateTime, Utc};

use crate::engine::reconcile::ChannelSet;
use crate::engine::series::TimeSeries;
use crate::engine::tariff::{PriceDay, PriceTable};
use crate::engine::types::{Channel, PriceNode};
use crate::error::SourceError;

/// Supplies power readings for a channel, already in canonical signs.
pub trait TelemetrySource {
    /// Samples for `channel` with `from <= t <= to`.
    fn telemetry(
        &self,
        channel: Channel,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError>;
}

/// Supplies published hourly prices.
pub trait PriceSource {
    fn price_nodes(&self, day: PriceDay) -> Result<Vec<PriceNode>, SourceError>;

    /// Live price for the current hour, if the provider publishes one.
    fn current_price(&self) -> Result<Option<PriceNode>, SourceError>;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for &T {
    fn telemetry(
        &self,
        channel: Channel,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        (**self).telemetry(channel, from, to)
    }
}

impl<P: PriceSource + ?Sized> PriceSource for &P {
    fn price_nodes(&self, day: PriceDay) -> Result<Vec<PriceNode>, SourceError> {
        (**self).price_nodes(day)
    }

    fn current_price(&self) -> Result<Option<PriceNode>, SourceError> {
        (**self).current_price()
    }
}

/// Telemetry held in memory, e.g. imported from CSV or generated synthetically.
#[derive(Debug, Clone, Default)]
pub struct MemoryTelemetry {
    channels: ChannelSet,
}

impl MemoryTelemetry {
    pub fn new(channels: ChannelSet) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }
}

impl TelemetrySource for MemoryTelemetry {
    fn telemetry(
        &self,
        channel: Channel,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        Ok(self.channels.get(channel).between(from, to))
    }
}

/// Prices held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrices {
    table: PriceTable,
}

impl MemoryPrices {
    pub fn new(table: PriceTable) -> Self {
        Self { table }
    }
}

impl PriceSource for MemoryPrices {
    fn price_nodes(&self, day: PriceDay) -> Result<Vec<PriceNode>, SourceError> {
        Ok(self.table.list(day).to_vec())
    }

    fn current_price(&self) -> Result<Option<PriceNode>, SourceError> {
        Ok(self.table.current.clone())
    }
}
