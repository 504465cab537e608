use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::clock::{BucketWidth, WallClock};
use crate::engine::types::PriceNode;
use crate::error::TariffError;

/// Which published price list a node came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDay {
    /// Trailing hours before today, for windows that cross midnight.
    Recent,
    Today,
    Tomorrow,
}

impl PriceDay {
    /// Lists in override order: later lists win on duplicate hours.
    pub const ALL: [PriceDay; 3] = [PriceDay::Recent, PriceDay::Today, PriceDay::Tomorrow];
}

impl fmt::Display for PriceDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PriceDay::Recent => "recent",
            PriceDay::Today => "today",
            PriceDay::Tomorrow => "tomorrow",
        })
    }
}

/// Raw price lists as published, plus the live price for the current hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    #[serde(default)]
    pub recent: Vec<PriceNode>,
    #[serde(default)]
    pub today: Vec<PriceNode>,
    #[serde(default)]
    pub tomorrow: Vec<PriceNode>,
    #[serde(default)]
    pub current: Option<PriceNode>,
}

impl PriceTable {
    pub fn list(&self, day: PriceDay) -> &[PriceNode] {
        match day {
            PriceDay::Recent => &self.recent,
            PriceDay::Today => &self.today,
            PriceDay::Tomorrow => &self.tomorrow,
        }
    }

    pub fn set_list(&mut self, day: PriceDay, nodes: Vec<PriceNode>) {
        match day {
            PriceDay::Recent => self.recent = nodes,
            PriceDay::Today => self.today = nodes,
            PriceDay::Tomorrow => self.tomorrow = nodes,
        }
    }
}

/// Local wall-clock hour a price applies to.
///
/// Keyed by the UTC instant the local hour starts, which is equivalent to
/// (local date, local hour, UTC offset): the repeated hour at a DST fall-back gets two
/// distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HourKey(DateTime<Utc>);

impl HourKey {
    pub fn start(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Whether costs include taxes and grid fees, and how large those are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TariffPolicy {
    pub include_fees_and_taxes: bool,
    /// Added to the buy price when fees are included (currency per kWh).
    pub buy_fees_per_kwh: f64,
    /// Added to the export credit when fees are included (currency per kWh).
    pub sell_benefits_per_kwh: f64,
}

impl TariffPolicy {
    /// Spot prices only, with no fee components configured.
    pub fn spot_only() -> Self {
        Self {
            include_fees_and_taxes: false,
            buy_fees_per_kwh: 0.0,
            sell_benefits_per_kwh: 0.0,
        }
    }

    pub fn with_fees(self, include_fees_and_taxes: bool) -> Self {
        Self {
            include_fees_and_taxes,
            ..self
        }
    }

    /// Price paid per imported kWh.
    pub fn buy_price(&self, node: &PriceNode) -> f64 {
        if self.include_fees_and_taxes {
            node.total_per_kwh + self.buy_fees_per_kwh
        } else {
            node.total_per_kwh
        }
    }

    /// Credit received per exported kWh.
    pub fn sell_price(&self, node: &PriceNode) -> f64 {
        if self.include_fees_and_taxes {
            node.energy_per_kwh + self.sell_benefits_per_kwh
        } else {
            node.energy_per_kwh
        }
    }
}

impl Default for TariffPolicy {
    fn default() -> Self {
        Self::spot_only()
    }
}

/// Resolves the price node for an hour bucket.
///
/// At most one node is kept per local hour, so every priced bucket matches exactly one
/// node.
#[derive(Debug, Clone)]
pub struct TariffMatcher {
    clock: WallClock,
    nodes: BTreeMap<HourKey, PriceNode>,
    current: Option<(HourKey, PriceNode)>,
}

impl TariffMatcher {
    pub fn new(table: PriceTable, clock: WallClock) -> Self {
        let mut nodes = BTreeMap::new();
        let PriceTable {
            recent,
            today,
            tomorrow,
            current,
        } = table;
        for node in recent.into_iter().chain(today).chain(tomorrow) {
            let key = node_key(&clock, &node);
            if let Some(previous) = nodes.insert(key, node) {
                warn!(
                    hour = %previous.starts_at,
                    "duplicate price node for hour, keeping the later list's value"
                );
            }
        }
        let current = current.map(|n| (node_key(&clock, &n), n));
        debug!(nodes = nodes.len(), live = current.is_some(), "built price table");
        Self {
            clock,
            nodes,
            current,
        }
    }

    /// Key of the hour containing `t`.
    pub fn key_for(&self, t: DateTime<Utc>) -> HourKey {
        HourKey(self.clock.floor(t, BucketWidth::Hour))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First covered hour start and last covered hour end.
    pub fn coverage(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.nodes.keys().next()?;
        let last = self.nodes.keys().next_back()?;
        Some((first.0, last.0 + Duration::hours(1)))
    }

    /// Node for the hour containing `t`.
    ///
    /// # Errors
    ///
    /// [`TariffError::NoPriceForPeriod`] if the hour is inside the covered range but has
    /// no node, [`TariffError::StalePriceWindow`] if it lies outside the range.
    pub fn lookup(&self, t: DateTime<Utc>) -> Result<&PriceNode, TariffError> {
        let key = self.key_for(t);
        if let Some(node) = self.nodes.get(&key) {
            return Ok(node);
        }
        let period_start = key.0;
        match self.coverage() {
            Some((from, to)) if period_start >= from && period_start < to => {
                Err(TariffError::NoPriceForPeriod { period_start })
            }
            _ => Err(TariffError::StalePriceWindow { period_start }),
        }
    }

    /// Like [`lookup`](Self::lookup), but the hour containing `now` prefers the live
    /// current price when it belongs to that same hour.
    ///
    /// # Errors
    ///
    /// Same as [`lookup`](Self::lookup).
    pub fn lookup_live(
        &self,
        t: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<&PriceNode, TariffError> {
        let key = self.key_for(t);
        if key == self.key_for(now) {
            match &self.current {
                Some((live_key, node)) if *live_key == key => return Ok(node),
                Some((live_key, _)) => {
                    debug!(live = %live_key.0, bucket = %key.0, "live price is for another hour");
                }
                None => {}
            }
        }
        self.lookup(t)
    }
}

/// Node start times are rounded to the nearest hour before keying.
fn node_key(clock: &WallClock, node: &PriceNode) -> HourKey {
    HourKey(clock.floor(node.starts_at + Duration::minutes(30), BucketWidth::Hour))
}
