//! Normalisation of external payload shapes into canonical signs and price nodes.
//!
//! Every device reports its own sign convention. Adapters convert at the boundary so
//! the engine only ever sees one: grid positive when importing, battery positive when
//! discharging.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;

use crate::engine::reconcile::InstantReading;
use crate::engine::series::{PowerSample, TimeSeries};
use crate::engine::tariff::PriceTable;
use crate::engine::types::PriceNode;

/// Battery series reported charge-positive (positive while charging).
pub fn battery_from_charge_positive(series: &TimeSeries) -> TimeSeries {
    series.map(|w| -w)
}

/// One storage reading with separate, non-negative charge and discharge powers.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StorageReading {
    pub timestamp: DateTime<Utc>,
    pub charge: f64,
    pub discharge: f64,
}

/// Split storage readings as `BatteryNet = discharge - charge`.
pub fn battery_from_storage(readings: &[StorageReading]) -> TimeSeries {
    TimeSeries::from_unsorted(
        readings
            .iter()
            .map(|r| PowerSample::new(r.timestamp, r.discharge.abs() - r.charge.abs()))
            .collect(),
    )
}

/// Merges separately filtered import and export series into `GridNet`.
///
/// The export series may carry either negative values or magnitudes; both are read as
/// export. When both series have a sample at the same instant they are summed.
pub fn grid_from_split(import: &TimeSeries, export: &TimeSeries) -> TimeSeries {
    let mut merged: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for s in import.iter() {
        *merged.entry(s.timestamp).or_default() += s.watts.abs();
    }
    for s in export.iter() {
        *merged.entry(s.timestamp).or_default() -= s.watts.abs();
    }
    TimeSeries::from_unsorted(
        merged
            .into_iter()
            .map(|(t, w)| PowerSample::new(t, w))
            .collect(),
    )
}

/// Live gauge payload: `battery` is charge-positive, `grid` import-positive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GaugeReading {
    pub timestamp: DateTime<Utc>,
    pub pv: f64,
    pub usage: f64,
    pub grid: f64,
    pub battery: f64,
}

impl From<GaugeReading> for InstantReading {
    fn from(g: GaugeReading) -> Self {
        InstantReading {
            timestamp: g.timestamp,
            solar_w: g.pv,
            load_w: g.usage,
            grid_w: g.grid,
            battery_w: -g.battery,
        }
    }
}

/// Price node in the supplier API's shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TibberPriceNode {
    pub total: f64,
    pub energy: f64,
    pub tax: f64,
    pub starts_at: DateTime<FixedOffset>,
}

impl From<TibberPriceNode> for PriceNode {
    fn from(n: TibberPriceNode) -> Self {
        PriceNode {
            starts_at: n.starts_at.with_timezone(&Utc),
            total_per_kwh: n.total,
            energy_per_kwh: n.energy,
            tax_per_kwh: n.tax,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TibberRange {
    #[serde(default)]
    pub nodes: Vec<TibberPriceNode>,
}

/// The supplier's `priceInfo` object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TibberPriceInfo {
    #[serde(default)]
    pub current: Option<TibberPriceNode>,
    #[serde(default)]
    pub today: Vec<TibberPriceNode>,
    #[serde(default)]
    pub tomorrow: Vec<TibberPriceNode>,
    #[serde(default)]
    pub range: Option<TibberRange>,
}

impl From<TibberPriceInfo> for PriceTable {
    fn from(info: TibberPriceInfo) -> Self {
        PriceTable {
            recent: info
                .range
                .map(|r| r.nodes.into_iter().map(PriceNode::from).collect())
                .unwrap_or_default(),
            today: info.today.into_iter().map(PriceNode::from).collect(),
            tomorrow: info.tomorrow.into_iter().map(PriceNode::from).collect(),
            current: info.current.map(PriceNode::from),
        }
    }
}

/// Parses a supplier `priceInfo` JSON document.
///
/// # Errors
///
/// Returns the JSON error if the document does not have the expected shape.
pub fn price_table_from_tibber_json(json: &str) -> Result<PriceTable, serde_json::Error> {
    serde_json::from_str::<TibberPriceInfo>(json).map(PriceTable::from)
}

/// Price node in the public day-ahead API's shape. Carries no tax split.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElprisetPriceNode {
    #[serde(rename = "SEK_per_kWh")]
    pub sek_per_kwh: f64,
    pub time_start: DateTime<FixedOffset>,
}

impl From<ElprisetPriceNode> for PriceNode {
    fn from(n: ElprisetPriceNode) -> Self {
        PriceNode {
            starts_at: n.time_start.with_timezone(&Utc),
            total_per_kwh: n.sek_per_kwh,
            energy_per_kwh: n.sek_per_kwh,
            tax_per_kwh: 0.0,
        }
    }
}

/// Parses a day-ahead JSON array into price nodes.
///
/// # Errors
///
/// Returns the JSON error if the document does not have the expected shape.
pub fn price_nodes_from_elpriset_json(json: &str) -> Result<Vec<PriceNode>, serde_json::Error> {
    serde_json::from_str::<Vec<ElprisetPriceNode>>(json)
        .map(|nodes| nodes.into_iter().map(PriceNode::from).collect())
}
