use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::ReconciliationConfig;
use crate::engine::series::TimeSeries;
use crate::engine::types::{Channel, FlowComponent, FlowDecomposition, LoadSource};
use crate::error::ReconciliationFailure;

/// The four measured channels for one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSet {
    channels: BTreeMap<Channel, TimeSeries>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: Channel, series: TimeSeries) {
        self.channels.insert(channel, series);
    }

    pub fn with(mut self, channel: Channel, series: TimeSeries) -> Self {
        self.insert(channel, series);
        self
    }

    /// Series for `channel`; a missing channel reads as empty.
    pub fn get(&self, channel: Channel) -> &TimeSeries {
        static EMPTY: TimeSeries = TimeSeries::EMPTY;
        self.channels.get(&channel).unwrap_or(&EMPTY)
    }

    /// Restricts every channel to `from <= t <= to`.
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> ChannelSet {
        Self {
            channels: self
                .channels
                .iter()
                .map(|(c, s)| (*c, s.between(from, to)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.values().all(TimeSeries::is_empty)
    }
}

/// All four channel readings aligned to one instant, in canonical signs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstantReading {
    pub timestamp: DateTime<Utc>,
    pub solar_w: f64,
    pub load_w: f64,
    pub grid_w: f64,
    pub battery_w: f64,
}

/// Turns raw channel readings into non-negative, balanced flows.
///
/// Stateless: the same readings and configuration always give the same output.
#[derive(Debug, Clone, Default)]
pub struct FlowReconciler {
    config: ReconciliationConfig,
}

impl FlowReconciler {
    pub fn new(config: ReconciliationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Aligns the channels on the reference channel's timestamps.
    ///
    /// Each channel contributes its latest sample at or before the instant. An instant
    /// is dropped when any channel has no such sample or it is older than
    /// `max_sample_age_secs`.
    pub fn join(&self, channels: &ChannelSet) -> Vec<InstantReading> {
        let reference = channels.get(self.config.reference_channel);
        let max_age = Duration::seconds(self.config.max_sample_age_secs);
        let pick = |channel: Channel, t: DateTime<Utc>| {
            channels
                .get(channel)
                .last_before(t)
                .filter(|s| t - s.timestamp <= max_age)
                .map(|s| s.watts)
        };

        let readings: Vec<InstantReading> = reference
            .iter()
            .filter_map(|s| {
                let t = s.timestamp;
                Some(InstantReading {
                    timestamp: t,
                    solar_w: pick(Channel::Solar, t)?,
                    load_w: pick(Channel::Load, t)?,
                    grid_w: pick(Channel::GridNet, t)?,
                    battery_w: pick(Channel::BatteryNet, t)?,
                })
            })
            .collect();

        let dropped = reference.len() - readings.len();
        if dropped > 0 {
            debug!(
                dropped,
                reference = %self.config.reference_channel,
                "dropped instants with missing or stale channel samples"
            );
        }
        readings
    }

    /// Whether the measured load should override the estimate.
    ///
    /// Requires both a relative disagreement above `relative_tolerance` and battery
    /// throughput above `battery_floor_w`.
    fn trust_measured(&self, measured: f64, estimated: f64, battery_flow: f64) -> bool {
        let scale = measured.abs().max(estimated.abs());
        if scale <= f64::EPSILON {
            return false;
        }
        let disagreement = (measured - estimated).abs() / scale;
        disagreement > self.config.relative_tolerance && battery_flow > self.config.battery_floor_w
    }

    /// Decomposes one aligned reading into flows.
    pub fn reconcile_instant(&self, reading: &InstantReading) -> FlowDecomposition {
        let mut failures = Vec::new();
        let solar = clamp(reading.solar_w, FlowComponent::Solar, &mut failures);

        let charge = (-reading.battery_w).max(0.0);
        let discharge = reading.battery_w.max(0.0);
        let delivered = self.config.discharge_efficiency * discharge;
        let grid_import = reading.grid_w.max(0.0);
        let grid_export = (-reading.grid_w).max(0.0);

        let estimated = grid_import - grid_export + solar + delivered - charge;
        let (raw_load, load_source) =
            if self.trust_measured(reading.load_w, estimated, charge + discharge) {
                (reading.load_w, LoadSource::Measured)
            } else {
                (estimated, LoadSource::Estimated)
            };
        let load = clamp(raw_load, FlowComponent::Load, &mut failures);

        let mut decomposition = FlowDecomposition {
            timestamp: reading.timestamp,
            solar_w: solar,
            load_w: load,
            self_used_solar_w: solar.min(load),
            grid_import_w: grid_import,
            grid_export_w: grid_export,
            battery_charge_w: charge,
            battery_discharge_w: delivered,
            load_source,
            failures,
        };

        let residual = decomposition.balance_residual_w();
        if residual.abs() > self.config.balance_tolerance_w {
            decomposition
                .failures
                .push(ReconciliationFailure::Unbalanced {
                    residual_w: residual,
                });
        }
        if !decomposition.failures.is_empty() {
            debug!(
                at = %decomposition.timestamp,
                failures = ?decomposition.failures,
                "instant did not reconcile cleanly"
            );
        }
        decomposition
    }

    /// Joins and decomposes every instant in the window.
    pub fn reconcile(&self, channels: &ChannelSet) -> Vec<FlowDecomposition> {
        self.join(channels)
            .iter()
            .map(|r| self.reconcile_instant(r))
            .collect()
    }
}

fn clamp(value: f64, component: FlowComponent, failures: &mut Vec<ReconciliationFailure>) -> f64 {
    if value < 0.0 {
        failures.push(ReconciliationFailure::NegativeComponent {
            component,
            value_w: value,
        });
        0.0
    } else {
        value
    }
}
