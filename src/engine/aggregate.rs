use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::engine::clock::{BucketWidth, WallClock};
use crate::engine::series::{PowerSample, TimeSeries};
use crate::engine::types::{EnergyBucket, FlowComponent, FlowDecomposition, SeriesKey};
use crate::error::SeriesError;

fn hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3.6e6
}

/// Integrates power series into wall-clock energy buckets.
///
/// Energy of a complete bucket is the trapezoidal integral of the series across it,
/// interpolated at the edges, so complete buckets add up to [`TimeSeries::integrate_wh`].
/// The bucket containing `now` is partial: the time-weighted mean so far times the
/// elapsed time. Buckets without samples are kept so bar charts have no gaps.
#[derive(Debug, Clone, Copy)]
pub struct BucketAggregator {
    width: BucketWidth,
    clock: WallClock,
}

impl BucketAggregator {
    pub fn new(width: BucketWidth, clock: WallClock) -> Self {
        Self { width, clock }
    }

    pub fn width(&self) -> BucketWidth {
        self.width
    }

    /// Buckets from the one holding the first sample up to the one holding `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when the series has no samples.
    pub fn aggregate(
        &self,
        series: &TimeSeries,
        key: SeriesKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<EnergyBucket>, SeriesError> {
        let first = series.first().ok_or(SeriesError::Empty)?.timestamp;
        self.aggregate_from(series, key, first, now)
    }

    /// Buckets from the one holding `from` up to the one holding `now`.
    ///
    /// Samples before `from`'s bucket or after `now` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when the series has no samples.
    pub fn aggregate_from(
        &self,
        series: &TimeSeries,
        key: SeriesKey,
        from: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<EnergyBucket>, SeriesError> {
        if series.is_empty() {
            return Err(SeriesError::Empty);
        }
        let periods = self.clock.periods(from, now, self.width);
        let Some(&(window_start, _)) = periods.first() else {
            return Ok(Vec::new());
        };
        let seen = series.between(window_start, now);

        Ok(seen
            .resample_periods(&periods)
            .into_iter()
            .map(|r| {
                let is_partial = r.period_start <= now && now < r.period_end;
                let energy_wh = if is_partial {
                    r.mean_w * hours(r.period_start, now)
                } else {
                    r.energy_wh
                };
                EnergyBucket {
                    period_start: r.period_start,
                    period_end: r.period_end,
                    series: key,
                    energy_wh,
                    mean_w: r.mean_w,
                    sample_count: r.sample_count,
                    is_partial,
                }
            })
            .collect())
    }
}

/// Energy buckets for every flow component over one window.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowBuckets {
    width: BucketWidth,
    buckets: BTreeMap<FlowComponent, Vec<EnergyBucket>>,
}

impl FlowBuckets {
    /// Aggregates each component of the decompositions from `from` up to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when there are no decompositions.
    pub fn from_flows(
        aggregator: &BucketAggregator,
        flows: &[FlowDecomposition],
        from: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, SeriesError> {
        if flows.is_empty() {
            return Err(SeriesError::Empty);
        }
        let mut buckets = BTreeMap::new();
        for component in FlowComponent::ALL {
            let series = component_series(flows, component);
            let aggregated =
                aggregator.aggregate_from(&series, SeriesKey::Flow(component), from, now)?;
            buckets.insert(component, aggregated);
        }
        Ok(Self {
            width: aggregator.width(),
            buckets,
        })
    }

    pub fn width(&self) -> BucketWidth {
        self.width
    }

    pub fn get(&self, component: FlowComponent) -> &[EnergyBucket] {
        self.buckets.get(&component).map_or(&[], Vec::as_slice)
    }

    /// Number of buckets per component; all components share the same periods.
    pub fn len(&self) -> usize {
        self.buckets.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowComponent, &Vec<EnergyBucket>)> {
        self.buckets.iter()
    }
}

/// One component of the decompositions as a time series.
pub fn component_series(flows: &[FlowDecomposition], component: FlowComponent) -> TimeSeries {
    TimeSeries::from_unsorted(
        flows
            .iter()
            .map(|f| PowerSample::new(f.timestamp, f.component(component)))
            .collect(),
    )
}
