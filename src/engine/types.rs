use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconciliationFailure;

/// A measured power channel.
///
/// Every channel carries one canonical sign convention once it has passed an adapter:
///
/// - `Solar` and `Load` are non-negative magnitudes.
/// - `GridNet > 0` means importing from the grid, `< 0` exporting to it.
/// - `BatteryNet > 0` means the battery is discharging, `< 0` charging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Solar,
    Load,
    GridNet,
    BatteryNet,
}

impl Channel {
    /// All channels in join order.
    pub const ALL: [Channel; 4] = [
        Channel::Solar,
        Channel::Load,
        Channel::GridNet,
        Channel::BatteryNet,
    ];

    /// Stable snake_case name, as used in CSV and TOML.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Solar => "solar",
            Channel::Load => "load",
            Channel::GridNet => "grid_net",
            Channel::BatteryNet => "battery_net",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-negative flow derived by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowComponent {
    Solar,
    Load,
    SelfUsedSolar,
    GridImport,
    GridExport,
    BatteryCharge,
    BatteryDischarge,
}

impl FlowComponent {
    pub const ALL: [FlowComponent; 7] = [
        FlowComponent::Solar,
        FlowComponent::Load,
        FlowComponent::SelfUsedSolar,
        FlowComponent::GridImport,
        FlowComponent::GridExport,
        FlowComponent::BatteryCharge,
        FlowComponent::BatteryDischarge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FlowComponent::Solar => "solar",
            FlowComponent::Load => "load",
            FlowComponent::SelfUsedSolar => "self_used_solar",
            FlowComponent::GridImport => "grid_import",
            FlowComponent::GridExport => "grid_export",
            FlowComponent::BatteryCharge => "battery_charge",
            FlowComponent::BatteryDischarge => "battery_discharge",
        }
    }
}

impl fmt::Display for FlowComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies what an [`EnergyBucket`] integrates: a raw channel or a reconciled flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKey {
    Measured(Channel),
    Flow(FlowComponent),
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKey::Measured(c) => write!(f, "measured.{c}"),
            SeriesKey::Flow(c) => write!(f, "flow.{c}"),
        }
    }
}

/// Which reading the reconciler settled on for household load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Measured,
    Estimated,
}

/// Reconciled flows at one instant, in watts. Every component is non-negative.
///
/// `battery_discharge_w` is the power delivered to the household bus, i.e. after
/// discharge losses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowDecomposition {
    pub timestamp: DateTime<Utc>,
    /// Total solar production after clamping.
    pub solar_w: f64,
    /// Household load chosen by trust arbitration.
    pub load_w: f64,
    pub self_used_solar_w: f64,
    pub grid_import_w: f64,
    pub grid_export_w: f64,
    pub battery_charge_w: f64,
    pub battery_discharge_w: f64,
    pub load_source: LoadSource,
    /// Diagnostics; empty when the instant reconciled cleanly.
    pub failures: Vec<ReconciliationFailure>,
}

impl FlowDecomposition {
    /// Value of a single flow component.
    pub fn component(&self, component: FlowComponent) -> f64 {
        match component {
            FlowComponent::Solar => self.solar_w,
            FlowComponent::Load => self.load_w,
            FlowComponent::SelfUsedSolar => self.self_used_solar_w,
            FlowComponent::GridImport => self.grid_import_w,
            FlowComponent::GridExport => self.grid_export_w,
            FlowComponent::BatteryCharge => self.battery_charge_w,
            FlowComponent::BatteryDischarge => self.battery_discharge_w,
        }
    }

    /// Supply minus demand: `solar + import + discharge - (load + charge + export)`.
    pub fn balance_residual_w(&self) -> f64 {
        self.solar_w + self.grid_import_w + self.battery_discharge_w
            - (self.load_w + self.battery_charge_w + self.grid_export_w)
    }

    pub fn is_reconciled(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for FlowDecomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | solar {:>7.1} W | load {:>7.1} W | self {:>7.1} W | imp {:>7.1} W | exp {:>7.1} W | chg {:>7.1} W | dis {:>7.1} W",
            self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.solar_w,
            self.load_w,
            self.self_used_solar_w,
            self.grid_import_w,
            self.grid_export_w,
            self.battery_charge_w,
            self.battery_discharge_w,
        )
    }
}

/// Energy integrated over one wall-clock bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyBucket {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub series: SeriesKey,
    pub energy_wh: f64,
    /// Time-weighted mean power over the samples' span within the bucket (0 when empty).
    pub mean_w: f64,
    pub sample_count: usize,
    /// True for the bucket that contains `now`; its energy covers only the elapsed part.
    pub is_partial: bool,
}

/// One hourly spot price, in currency per kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceNode {
    pub starts_at: DateTime<Utc>,
    /// Full buy price including the supplier's tax component.
    pub total_per_kwh: f64,
    /// Energy component; the basis for export credit.
    pub energy_per_kwh: f64,
    pub tax_per_kwh: f64,
}
