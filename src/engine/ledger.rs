//! Hourly cost attribution.

use std::fmt;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::engine::aggregate::FlowBuckets;
use crate::engine::clock::{BucketWidth, WallClock};
use crate::engine::tariff::{TariffMatcher, TariffPolicy};
use crate::engine::types::{FlowComponent, PriceNode};
use crate::error::{self, Error, TariffError};

/// What self-consumed solar was worth, measured two ways.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SelfUseValue {
    /// Cost of buying the same energy from the grid.
    pub avoided_import_cost: f64,
    /// Credit that exporting the same energy would have earned.
    pub forgone_export_gain: f64,
}

impl Add for SelfUseValue {
    type Output = SelfUseValue;

    fn add(self, rhs: SelfUseValue) -> SelfUseValue {
        SelfUseValue {
            avoided_import_cost: self.avoided_import_cost + rhs.avoided_import_cost,
            forgone_export_gain: self.forgone_export_gain + rhs.forgone_export_gain,
        }
    }
}

impl AddAssign for SelfUseValue {
    fn add_assign(&mut self, rhs: SelfUseValue) {
        *self = *self + rhs;
    }
}

/// Energy and money for one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostLedgerEntry {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub is_partial: bool,
    pub consumed_wh: f64,
    pub produced_wh: f64,
    /// Gross energy drawn from the grid over the period.
    pub import_wh: f64,
    /// Gross energy fed into the grid over the period.
    pub export_wh: f64,
    /// `import_wh - export_wh`; only this net figure is priced.
    pub net_grid_wh: f64,
    pub self_used_wh: f64,
    pub import_cost: f64,
    pub export_gain: f64,
    pub self_use: SelfUseValue,
    /// `import_cost - export_gain`.
    pub net_cost: f64,
    /// Node the period was priced with; `None` when unpriced or rolled up.
    pub price: Option<PriceNode>,
    /// Why the period, or part of a rolled-up period, could not be priced.
    pub price_error: Option<TariffError>,
}

impl CostLedgerEntry {
    pub fn is_priced(&self) -> bool {
        self.price_error.is_none()
    }
}

impl fmt::Display for CostLedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | load {:>8.1} Wh | imp {:>8.1} Wh | exp {:>8.1} Wh | self {:>8.1} Wh | net {:>8.3}",
            self.period_start.format("%Y-%m-%d %H:%M"),
            self.consumed_wh,
            self.import_wh,
            self.export_wh,
            self.self_used_wh,
            self.net_cost,
        )?;
        if self.is_partial {
            f.write_str(" (partial)")?;
        }
        if let Some(e) = &self.price_error {
            write!(f, " [{e}]")?;
        }
        Ok(())
    }
}

/// Sums over a set of ledger entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LedgerTotals {
    pub consumed_wh: f64,
    pub produced_wh: f64,
    pub import_wh: f64,
    pub export_wh: f64,
    pub net_grid_wh: f64,
    pub self_used_wh: f64,
    pub import_cost: f64,
    pub export_gain: f64,
    pub self_use: SelfUseValue,
    pub net_cost: f64,
}

/// Hourly ledger for one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    pub entries: Vec<CostLedgerEntry>,
}

impl Ledger {
    pub fn totals(&self) -> LedgerTotals {
        totals(&self.entries)
    }

    pub fn unpriced(&self) -> impl Iterator<Item = &CostLedgerEntry> {
        self.entries.iter().filter(|e| !e.is_priced())
    }

    /// Sums hourly entries into wider periods (typically days).
    pub fn rollup(&self, width: BucketWidth, clock: &WallClock) -> Vec<CostLedgerEntry> {
        let mut out: Vec<CostLedgerEntry> = Vec::new();
        let mut group: Vec<&CostLedgerEntry> = Vec::new();
        let mut group_start = None;

        for entry in &self.entries {
            let start = clock.floor(entry.period_start, width);
            if group_start != Some(start) {
                if let Some(s) = group_start {
                    out.push(rolled_up(s, clock.next_boundary(s, width), &group));
                }
                group.clear();
                group_start = Some(start);
            }
            group.push(entry);
        }
        if let Some(s) = group_start {
            out.push(rolled_up(s, clock.next_boundary(s, width), &group));
        }
        out
    }
}

fn totals<'a>(entries: impl IntoIterator<Item = &'a CostLedgerEntry>) -> LedgerTotals {
    let mut t = LedgerTotals::default();
    for e in entries {
        t.consumed_wh += e.consumed_wh;
        t.produced_wh += e.produced_wh;
        t.import_wh += e.import_wh;
        t.export_wh += e.export_wh;
        t.net_grid_wh += e.net_grid_wh;
        t.self_used_wh += e.self_used_wh;
        t.import_cost += e.import_cost;
        t.export_gain += e.export_gain;
        t.self_use += e.self_use;
        t.net_cost += e.net_cost;
    }
    t
}

fn rolled_up(
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    group: &[&CostLedgerEntry],
) -> CostLedgerEntry {
    let t = totals(group.iter().copied());
    CostLedgerEntry {
        period_start,
        period_end,
        is_partial: group.iter().any(|e| e.is_partial),
        consumed_wh: t.consumed_wh,
        produced_wh: t.produced_wh,
        import_wh: t.import_wh,
        export_wh: t.export_wh,
        net_grid_wh: t.net_grid_wh,
        self_used_wh: t.self_used_wh,
        import_cost: t.import_cost,
        export_gain: t.export_gain,
        self_use: t.self_use,
        net_cost: t.net_cost,
        price: None,
        price_error: group.iter().find_map(|e| e.price_error.clone()),
    }
}

/// Energy of one hour bucket, by flow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HourEnergy {
    pub consumed_wh: f64,
    pub produced_wh: f64,
    pub import_wh: f64,
    pub export_wh: f64,
    pub self_used_wh: f64,
}

/// Prices hourly flow buckets into a [`Ledger`].
#[derive(Debug, Clone, Copy)]
pub struct CostAttributor {
    policy: TariffPolicy,
}

impl CostAttributor {
    pub fn new(policy: TariffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TariffPolicy {
        &self.policy
    }

    /// One ledger entry per hour bucket.
    ///
    /// Unpriced hours keep their energy, contribute zero cost, and carry the lookup
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotHourly`] unless `flows` were bucketed per hour.
    pub fn attribute(
        &self,
        flows: &FlowBuckets,
        matcher: &TariffMatcher,
        now: DateTime<Utc>,
    ) -> error::Result<Ledger> {
        if flows.width() != BucketWidth::Hour {
            return Err(Error::NotHourly {
                width: flows.width(),
            });
        }
        let imports = flows.get(FlowComponent::GridImport);
        let entries = imports
            .iter()
            .enumerate()
            .map(|(i, bucket)| {
                let wh = |c: FlowComponent| flows.get(c).get(i).map_or(0.0, |b| b.energy_wh);
                let energy = HourEnergy {
                    consumed_wh: wh(FlowComponent::Load),
                    produced_wh: wh(FlowComponent::Solar),
                    import_wh: bucket.energy_wh,
                    export_wh: wh(FlowComponent::GridExport),
                    self_used_wh: wh(FlowComponent::SelfUsedSolar),
                };
                let price = if bucket.is_partial {
                    matcher.lookup_live(bucket.period_start, now)
                } else {
                    matcher.lookup(bucket.period_start)
                };
                self.price_entry(
                    bucket.period_start,
                    bucket.period_end,
                    bucket.is_partial,
                    energy,
                    price,
                )
            })
            .collect();
        Ok(Ledger { entries })
    }

    /// Builds the entry for one period from its energy and price lookup.
    ///
    /// Import and export within the period offset each other first: a net import is
    /// charged at the buy price, a net export credited at the sell price.
    pub fn price_entry(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        is_partial: bool,
        energy: HourEnergy,
        price: Result<&PriceNode, TariffError>,
    ) -> CostLedgerEntry {
        let mut entry = CostLedgerEntry {
            period_start,
            period_end,
            is_partial,
            consumed_wh: energy.consumed_wh,
            produced_wh: energy.produced_wh,
            import_wh: energy.import_wh,
            export_wh: energy.export_wh,
            net_grid_wh: energy.import_wh - energy.export_wh,
            self_used_wh: energy.self_used_wh,
            import_cost: 0.0,
            export_gain: 0.0,
            self_use: SelfUseValue::default(),
            net_cost: 0.0,
            price: None,
            price_error: None,
        };
        match price {
            Ok(node) => {
                let buy = self.policy.buy_price(node);
                let sell = self.policy.sell_price(node);
                entry.import_cost = entry.net_grid_wh.max(0.0) / 1000.0 * buy;
                entry.export_gain = (-entry.net_grid_wh).max(0.0) / 1000.0 * sell;
                entry.net_cost = entry.import_cost - entry.export_gain;
                entry.self_use = SelfUseValue {
                    avoided_import_cost: energy.self_used_wh / 1000.0 * buy,
                    forgone_export_gain: energy.self_used_wh / 1000.0 * sell,
                };
                entry.price = Some(node.clone());
            }
            Err(e) => {
                warn!(period = %period_start, error = %e, "unpriced bucket excluded from costs");
                entry.price_error = Some(e);
            }
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
    }

    fn node(total: f64, energy: f64) -> PriceNode {
        PriceNode {
            starts_at: t(0),
            total_per_kwh: total,
            energy_per_kwh: energy,
            tax_per_kwh: total - energy,
        }
    }

    fn energy(import_wh: f64, export_wh: f64, self_used_wh: f64) -> HourEnergy {
        HourEnergy {
            consumed_wh: import_wh + self_used_wh,
            produced_wh: export_wh + self_used_wh,
            import_wh,
            export_wh,
            self_used_wh,
        }
    }

    #[test]
    fn import_priced_at_total_without_fees() {
        let attributor = CostAttributor::new(TariffPolicy::spot_only());
        let n = node(1.0, 0.8);
        let e = attributor.price_entry(t(0), t(1), false, energy(2000.0, 0.0, 0.0), Ok(&n));
        assert!((e.import_cost - 2.0).abs() < 1e-9);
        assert!((e.net_cost - 2.0).abs() < 1e-9);
        assert!(e.is_priced());
    }

    #[test]
    fn export_credited_at_energy_component_plus_benefits() {
        let policy = TariffPolicy {
            include_fees_and_taxes: true,
            buy_fees_per_kwh: 0.74,
            sell_benefits_per_kwh: 0.68,
        };
        let n = node(1.0, 0.8);
        let e = CostAttributor::new(policy).price_entry(
            t(0),
            t(1),
            false,
            energy(0.0, 1000.0, 0.0),
            Ok(&n),
        );
        assert!((e.export_gain - 1.48).abs() < 1e-9);
        assert!((e.net_cost + 1.48).abs() < 1e-9);
    }

    #[test]
    fn import_and_export_in_one_hour_offset_before_pricing() {
        let n = node(1.0, 0.8);
        let attributor = CostAttributor::new(TariffPolicy::spot_only());
        let even = attributor.price_entry(t(0), t(1), false, energy(1000.0, 1000.0, 0.0), Ok(&n));
        assert_eq!(even.net_grid_wh, 0.0);
        assert_eq!(even.import_cost, 0.0);
        assert_eq!(even.export_gain, 0.0);
        assert_eq!(even.net_cost, 0.0);
        // gross flows stay on the entry
        assert_eq!(even.import_wh, 1000.0);
        assert_eq!(even.export_wh, 1000.0);

        let mostly_export =
            attributor.price_entry(t(1), t(2), false, energy(500.0, 1500.0, 0.0), Ok(&n));
        assert_eq!(mostly_export.import_cost, 0.0);
        assert!((mostly_export.export_gain - 0.8).abs() < 1e-9);
        assert!((mostly_export.net_cost + 0.8).abs() < 1e-9);
    }

    #[test]
    fn minute_flows_are_not_priced() {
        use crate::config::ReconciliationConfig;
        use crate::engine::aggregate::BucketAggregator;
        use crate::engine::reconcile::{FlowReconciler, InstantReading};
        use crate::engine::tariff::PriceTable;

        let flow = FlowReconciler::new(ReconciliationConfig::default()).reconcile_instant(
            &InstantReading {
                timestamp: t(0),
                solar_w: 0.0,
                load_w: 800.0,
                grid_w: 800.0,
                battery_w: 0.0,
            },
        );
        let clock = WallClock::utc();
        let minutes = BucketAggregator::new(BucketWidth::Minute, clock);
        let flows = FlowBuckets::from_flows(&minutes, &[flow], t(0), t(0)).unwrap();
        let matcher = TariffMatcher::new(PriceTable::default(), clock);
        let result = CostAttributor::new(TariffPolicy::spot_only()).attribute(&flows, &matcher, t(0));
        assert!(matches!(
            result,
            Err(Error::NotHourly {
                width: BucketWidth::Minute
            })
        ));
    }

    #[test]
    fn self_use_valued_both_ways() {
        let n = node(2.0, 1.5);
        let e = CostAttributor::new(TariffPolicy::spot_only()).price_entry(
            t(0),
            t(1),
            false,
            energy(0.0, 0.0, 500.0),
            Ok(&n),
        );
        assert!((e.self_use.avoided_import_cost - 1.0).abs() < 1e-9);
        assert!((e.self_use.forgone_export_gain - 0.75).abs() < 1e-9);
        // self-use never enters net cost
        assert_eq!(e.net_cost, 0.0);
    }

    #[test]
    fn unpriced_entry_keeps_energy_and_error() {
        let err = TariffError::NoPriceForPeriod { period_start: t(3) };
        let e = CostAttributor::new(TariffPolicy::spot_only()).price_entry(
            t(3),
            t(4),
            false,
            energy(1500.0, 0.0, 0.0),
            Err(err.clone()),
        );
        assert_eq!(e.import_wh, 1500.0);
        assert_eq!(e.import_cost, 0.0);
        assert_eq!(e.price_error, Some(err));
        assert!(!e.is_priced());
    }

    #[test]
    fn rollup_sums_hours_into_days() {
        let attributor = CostAttributor::new(TariffPolicy::spot_only());
        let n = node(1.0, 0.5);
        let entries = (0..30)
            .map(|h| {
                let start = t(0) + Duration::hours(h);
                attributor.price_entry(
                    start,
                    start + Duration::hours(1),
                    h == 29,
                    energy(1000.0, 0.0, 0.0),
                    Ok(&n),
                )
            })
            .collect();
        let ledger = Ledger { entries };
        let days = ledger.rollup(BucketWidth::Day, &WallClock::utc());
        assert!((days[0].net_grid_wh - 24_000.0).abs() < 1e-9);
        assert_eq!(days.len(), 2);
        assert!((days[0].import_wh - 24_000.0).abs() < 1e-9);
        assert!((days[0].import_cost - 24.0).abs() < 1e-9);
        assert!(!days[0].is_partial);
        assert!(days[1].is_partial);
        assert_eq!(days[1].period_start, t(0) + Duration::days(1));
        let totals = ledger.totals();
        assert!((totals.import_cost - 30.0).abs() < 1e-9);
    }
}
