//! End-to-end refresh: fetch, reconcile, bucket, price, summarize.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::engine::aggregate::{BucketAggregator, FlowBuckets};
use crate::engine::clock::{BucketWidth, WallClock};
use crate::engine::ledger::{CostAttributor, CostLedgerEntry, Ledger};
use crate::engine::reconcile::{ChannelSet, FlowReconciler};
use crate::engine::summary::Summary;
use crate::engine::tariff::{PriceDay, PriceTable, TariffMatcher, TariffPolicy};
use crate::engine::types::{Channel, EnergyBucket, FlowComponent, FlowDecomposition, SeriesKey};
use crate::error::{Result, SeriesError};
use crate::sources::{PriceSource, TelemetrySource};

/// Time range a snapshot covers: from `from` up to and including `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl Window {
    pub fn new(from: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self { from, now }
    }

    /// Local day so far.
    pub fn today(now: DateTime<Utc>, clock: &WallClock) -> Self {
        Self {
            from: clock.floor(now, BucketWidth::Day),
            now,
        }
    }

    /// The trailing `hours` whole local hours plus the current partial one.
    pub fn trailing_hours(now: DateTime<Utc>, hours: i64, clock: &WallClock) -> Self {
        Self {
            from: clock.floor(now - Duration::hours(hours), BucketWidth::Hour),
            now,
        }
    }
}

/// Buckets for one series in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesBuckets {
    pub series: SeriesKey,
    pub buckets: Vec<EnergyBucket>,
}

/// Everything the dashboard shows for one window, recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub window: Window,
    pub policy: TariffPolicy,
    pub bucket_width: BucketWidth,
    pub flows: Vec<FlowDecomposition>,
    /// Display buckets for every measured channel and flow component.
    pub buckets: Vec<SeriesBuckets>,
    /// Hourly priced ledger.
    pub ledger: Ledger,
    pub daily: Vec<CostLedgerEntry>,
    pub summary: Summary,
}

impl Snapshot {
    /// Most recent decomposition, as shown on the live gauge.
    pub fn latest(&self) -> Option<&FlowDecomposition> {
        self.flows.last()
    }

    pub fn buckets_for(&self, series: SeriesKey) -> Option<&[EnergyBucket]> {
        self.buckets
            .iter()
            .find(|b| b.series == series)
            .map(|b| b.buckets.as_slice())
    }
}

/// Reconciliation and attribution engine.
///
/// Generic over its collaborators for static dispatch. Holds only the injected
/// sources and immutable configuration, so every refresh recomputes from scratch and
/// identical inputs give identical snapshots.
pub struct Engine<T: TelemetrySource, P: PriceSource> {
    config: EngineConfig,
    clock: WallClock,
    telemetry: T,
    prices: P,
}

impl<T: TelemetrySource, P: PriceSource> Engine<T, P> {
    /// Creates a new engine.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configured time zone is unknown.
    pub fn new(
        config: EngineConfig,
        telemetry: T,
        prices: P,
    ) -> std::result::Result<Self, ConfigError> {
        let clock = config.aggregation.clock()?;
        Ok(Self {
            config,
            clock,
            telemetry,
            prices,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &WallClock {
        &self.clock
    }

    /// Tariff policy from configuration.
    pub fn default_policy(&self) -> TariffPolicy {
        self.config.tariff.policy()
    }

    /// Fetches the window's telemetry and prices and computes a snapshot.
    ///
    /// Price source failures degrade to unpriced hours; telemetry failures are fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if telemetry cannot be fetched or the window has no
    /// reconcilable instants.
    pub fn refresh(&self, window: Window, policy: TariffPolicy) -> Result<Snapshot> {
        let mut channels = ChannelSet::new();
        for channel in Channel::ALL {
            let series = self.telemetry.telemetry(channel, window.from, window.now)?;
            channels.insert(channel, series);
        }
        let table = self.fetch_prices();
        self.compute(&channels, table, window, policy)
    }

    fn fetch_prices(&self) -> PriceTable {
        let mut table = PriceTable::default();
        for day in PriceDay::ALL {
            match self.prices.price_nodes(day) {
                Ok(nodes) => table.set_list(day, nodes),
                Err(e) => warn!(%day, error = %e, "price list unavailable"),
            }
        }
        match self.prices.current_price() {
            Ok(current) => table.current = current,
            Err(e) => warn!(error = %e, "live price unavailable"),
        }
        table
    }

    /// Computes a snapshot from already-fetched inputs.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] if no instant in the window could be reconciled.
    pub fn compute(
        &self,
        channels: &ChannelSet,
        table: PriceTable,
        window: Window,
        policy: TariffPolicy,
    ) -> Result<Snapshot> {
        let channels = channels.between(window.from, window.now);
        let reconciler = FlowReconciler::new(self.config.reconciliation.clone());
        let flows = reconciler.reconcile(&channels);
        if flows.is_empty() {
            return Err(SeriesError::Empty.into());
        }

        let hourly = BucketAggregator::new(BucketWidth::Hour, self.clock);
        let hourly_flows = FlowBuckets::from_flows(&hourly, &flows, window.from, window.now)?;
        let matcher = TariffMatcher::new(table, self.clock);
        let ledger = CostAttributor::new(policy).attribute(&hourly_flows, &matcher, window.now)?;
        let daily = ledger.rollup(BucketWidth::Day, &self.clock);
        let summary = Summary::from_parts(
            &ledger,
            hourly_flows.get(FlowComponent::GridImport),
            &flows,
        );

        let width = self.config.aggregation.bucket_width;
        let buckets = self.display_buckets(&channels, &flows, &hourly_flows, width, window)?;

        info!(
            from = %window.from,
            now = %window.now,
            instants = flows.len(),
            flagged = summary.reconciliation_failures,
            unpriced = summary.unpriced_periods.len(),
            net_cost = summary.net_cost,
            "refreshed snapshot"
        );

        Ok(Snapshot {
            window,
            policy,
            bucket_width: width,
            flows,
            buckets,
            ledger,
            daily,
            summary,
        })
    }

    fn display_buckets(
        &self,
        channels: &ChannelSet,
        flows: &[FlowDecomposition],
        hourly_flows: &FlowBuckets,
        width: BucketWidth,
        window: Window,
    ) -> Result<Vec<SeriesBuckets>> {
        let aggregator = BucketAggregator::new(width, self.clock);
        let mut out = Vec::new();

        for channel in Channel::ALL {
            let series = channels.get(channel);
            let key = SeriesKey::Measured(channel);
            let buckets = match aggregator.aggregate_from(series, key, window.from, window.now) {
                Ok(b) => b,
                Err(SeriesError::Empty) => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            out.push(SeriesBuckets {
                series: key,
                buckets,
            });
        }

        let flow_buckets = if width == BucketWidth::Hour {
            hourly_flows.clone()
        } else {
            FlowBuckets::from_flows(&aggregator, flows, window.from, window.now)?
        };
        for (component, buckets) in flow_buckets.iter() {
            out.push(SeriesBuckets {
                series: SeriesKey::Flow(*component),
                buckets: buckets.clone(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::series::TimeSeries;
    use crate::engine::types::PriceNode;
    use crate::error::Error;
    use crate::sources::{MemoryPrices, MemoryTelemetry};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn utc_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.aggregation.timezone = "UTC".to_string();
        config
    }

    fn constant(value: f64, minutes: usize) -> TimeSeries {
        TimeSeries::from_values(t0(), Duration::minutes(1), &vec![value; minutes])
    }

    fn night_import(minutes: usize) -> ChannelSet {
        ChannelSet::new()
            .with(Channel::Solar, constant(0.0, minutes))
            .with(Channel::Load, constant(1000.0, minutes))
            .with(Channel::GridNet, constant(1000.0, minutes))
            .with(Channel::BatteryNet, constant(0.0, minutes))
    }

    fn flat_prices(total: f64) -> PriceTable {
        PriceTable {
            today: (0..24)
                .map(|h| PriceNode {
                    starts_at: t0() + Duration::hours(h),
                    total_per_kwh: total,
                    energy_per_kwh: total,
                    tax_per_kwh: 0.0,
                })
                .collect(),
            ..PriceTable::default()
        }
    }

    #[test]
    fn refresh_is_idempotent() {
        let engine = Engine::new(
            utc_config(),
            MemoryTelemetry::new(night_import(150)),
            MemoryPrices::new(flat_prices(1.0)),
        )
        .unwrap();
        let window = Window::today(t0() + Duration::minutes(150), engine.clock());
        let a = engine.refresh(window, TariffPolicy::spot_only()).unwrap();
        let b = engine.refresh(window, TariffPolicy::spot_only()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn refresh_prices_whole_hours() {
        let engine = Engine::new(
            utc_config(),
            MemoryTelemetry::new(night_import(180)),
            MemoryPrices::new(flat_prices(1.0)),
        )
        .unwrap();
        let window = Window::new(t0(), t0() + Duration::hours(3));
        let snap = engine.refresh(window, TariffPolicy::spot_only()).unwrap();
        assert_eq!(snap.ledger.entries.len(), 4);
        assert!((snap.ledger.entries[0].import_cost - 1.0).abs() < 1e-9);
        assert!(snap.ledger.entries[3].is_partial);
        assert_eq!(snap.daily.len(), 1);
        assert!(snap.summary.unpriced_periods.is_empty());
        assert_eq!(snap.latest().map(|f| f.grid_import_w), Some(1000.0));
    }

    #[test]
    fn window_without_telemetry_is_empty() {
        let engine = Engine::new(
            utc_config(),
            MemoryTelemetry::default(),
            MemoryPrices::default(),
        )
        .unwrap();
        let err = engine.refresh(Window::new(t0(), t0() + Duration::hours(1)), TariffPolicy::spot_only());
        assert!(matches!(err, Err(Error::Series(SeriesError::Empty))));
    }

    #[test]
    fn minute_display_buckets_cover_every_series() {
        let mut config = utc_config();
        config.aggregation.bucket_width = BucketWidth::Minute;
        let engine = Engine::new(
            config,
            MemoryTelemetry::new(night_import(10)),
            MemoryPrices::new(flat_prices(1.0)),
        )
        .unwrap();
        let snap = engine
            .refresh(Window::new(t0(), t0() + Duration::minutes(9)), TariffPolicy::spot_only())
            .unwrap();
        assert_eq!(snap.buckets.len(), Channel::ALL.len() + FlowComponent::ALL.len());
        let load = snap.buckets_for(SeriesKey::Flow(FlowComponent::Load)).unwrap();
        assert_eq!(load.len(), 10);
        assert!((load[0].energy_wh - 1000.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let mut config = EngineConfig::default();
        config.aggregation.timezone = "Nowhere/Special".to_string();
        let engine = Engine::new(config, MemoryTelemetry::default(), MemoryPrices::default());
        assert!(engine.is_err());
    }
}
