//! Window summary computed from the reconciled flows and the priced ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::ledger::{Ledger, SelfUseValue};
use crate::engine::types::{EnergyBucket, FlowDecomposition};

/// Headline numbers for a dashboard window.
///
/// Computed post-hoc from the ledger and the decompositions so the summary always
/// agrees with the hourly entries it was derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Household consumption (Wh).
    pub total_consumed_wh: f64,
    /// Solar production (Wh).
    pub total_produced_wh: f64,
    /// Energy bought from the grid (Wh).
    pub total_imported_wh: f64,
    /// Energy sold to the grid (Wh).
    pub total_exported_wh: f64,
    /// Solar consumed on site (Wh).
    pub self_used_wh: f64,
    /// Highest hourly mean grid import (W).
    pub peak_power_w: f64,
    /// Highest instantaneous solar production (W).
    pub peak_solar_w: f64,
    pub import_cost: f64,
    pub export_gain: f64,
    /// `import_cost - export_gain`.
    pub net_cost: f64,
    /// Hundredths of a currency unit per consumed kWh; `None` when nothing was consumed.
    pub average_paid_price: Option<f64>,
    pub self_use: SelfUseValue,
    /// Starts of the hours left out of the cost totals.
    pub unpriced_periods: Vec<DateTime<Utc>>,
    /// Instants that carried at least one reconciliation diagnostic.
    pub reconciliation_failures: usize,
    /// Instants that were reconciled.
    pub instants: usize,
}

impl Summary {
    /// Builds the summary.
    ///
    /// # Arguments
    ///
    /// * `ledger` - Hourly ledger for the window
    /// * `hourly_import` - Hourly grid-import buckets for the window
    /// * `flows` - Per-instant decompositions for the window
    pub fn from_parts(
        ledger: &Ledger,
        hourly_import: &[EnergyBucket],
        flows: &[FlowDecomposition],
    ) -> Self {
        let totals = ledger.totals();
        let peak_power_w = hourly_import
            .iter()
            .filter(|b| b.sample_count > 0)
            .map(|b| b.mean_w)
            .fold(0.0, f64::max);
        let peak_solar_w = flows.iter().map(|f| f.solar_w).fold(0.0, f64::max);

        Self {
            total_consumed_wh: totals.consumed_wh,
            total_produced_wh: totals.produced_wh,
            total_imported_wh: totals.import_wh,
            total_exported_wh: totals.export_wh,
            self_used_wh: totals.self_used_wh,
            peak_power_w,
            peak_solar_w,
            import_cost: totals.import_cost,
            export_gain: totals.export_gain,
            net_cost: totals.net_cost,
            average_paid_price: average_paid_price(totals.import_cost, totals.consumed_wh),
            self_use: totals.self_use,
            unpriced_periods: ledger.unpriced().map(|e| e.period_start).collect(),
            reconciliation_failures: flows.iter().filter(|f| !f.is_reconciled()).count(),
            instants: flows.len(),
        }
    }
}

/// Cost per consumed energy in hundredths of a currency unit per kWh (e.g. öre/kWh).
///
/// `None` when nothing was consumed.
pub fn average_paid_price(cost: f64, consumed_wh: f64) -> Option<f64> {
    (consumed_wh > 0.0).then(|| cost / consumed_wh * 100_000.0)
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Summary ---")?;
        writeln!(f, "Consumed:              {:.2} kWh", self.total_consumed_wh / 1000.0)?;
        writeln!(f, "Produced:              {:.2} kWh", self.total_produced_wh / 1000.0)?;
        writeln!(f, "Self-used solar:       {:.2} kWh", self.self_used_wh / 1000.0)?;
        writeln!(
            f,
            "Imported / exported:   {:.2} / {:.2} kWh",
            self.total_imported_wh / 1000.0,
            self.total_exported_wh / 1000.0
        )?;
        writeln!(f, "Peak hourly import:    {:.0} W", self.peak_power_w)?;
        writeln!(f, "Peak solar:            {:.0} W", self.peak_solar_w)?;
        writeln!(
            f,
            "Import cost / gain:    {:.2} / {:.2}",
            self.import_cost, self.export_gain
        )?;
        writeln!(f, "Net cost:              {:.2}", self.net_cost)?;
        match self.average_paid_price {
            Some(p) => writeln!(f, "Average paid price:    {p:.1} /100 per kWh")?,
            None => writeln!(f, "Average paid price:    n/a")?,
        }
        writeln!(
            f,
            "Self-use value:        {:.2} avoided / {:.2} forgone",
            self.self_use.avoided_import_cost, self.self_use.forgone_export_gain
        )?;
        writeln!(f, "Unpriced hours:        {}", self.unpriced_periods.len())?;
        write!(
            f,
            "Flagged instants:      {} of {}",
            self.reconciliation_failures, self.instants
        )
    }
}
