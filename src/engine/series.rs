//! Ordered power time series.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::clock::{BucketWidth, WallClock};
use crate::error::SeriesError;

/// One power reading in watts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: DateTime<Utc>,
    pub watts: f64,
}

impl PowerSample {
    pub fn new(timestamp: DateTime<Utc>, watts: f64) -> Self {
        Self { timestamp, watts }
    }
}

/// One resampling bucket.
///
/// `mean_w` and `energy_wh` cover only the part of the period that lies between the
/// first and last sample; the series is interpolated linearly at the period edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resampled {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Time-weighted mean power (W).
    pub mean_w: f64,
    pub sample_count: usize,
    /// Trapezoidal energy (Wh).
    pub energy_wh: f64,
}

fn hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3.6e6
}

fn trapezoid_wh(a: (DateTime<Utc>, f64), b: (DateTime<Utc>, f64)) -> f64 {
    (a.1 + b.1) / 2.0 * hours(a.0, b.0)
}

/// Power samples strictly ascending by timestamp, with unique, finite values.
///
/// Aggregates over zero samples fail with [`SeriesError::Empty`] rather than
/// reporting zero, so callers can tell "no data yet" from "nothing flowed".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    samples: Vec<PowerSample>,
}

impl TimeSeries {
    pub const EMPTY: TimeSeries = TimeSeries {
        samples: Vec::new(),
    };

    /// Builds a series from samples that are already strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Unordered`] on a duplicate or out-of-order timestamp and
    /// [`SeriesError::NonFinite`] on NaN or infinite watts.
    pub fn new(samples: Vec<PowerSample>) -> Result<Self, SeriesError> {
        for (i, s) in samples.iter().enumerate() {
            if !s.watts.is_finite() {
                return Err(SeriesError::NonFinite { at: s.timestamp });
            }
            if i > 0 && s.timestamp <= samples[i - 1].timestamp {
                return Err(SeriesError::Unordered { at: s.timestamp });
            }
        }
        Ok(Self { samples })
    }

    /// Sorts and de-duplicates raw samples; on a duplicate timestamp the later input wins.
    /// Non-finite readings are dropped.
    pub fn from_unsorted(mut samples: Vec<PowerSample>) -> Self {
        samples.retain(|s| s.watts.is_finite());
        samples.sort_by_key(|s| s.timestamp);
        let mut out: Vec<PowerSample> = Vec::with_capacity(samples.len());
        for s in samples {
            match out.last_mut() {
                Some(last) if last.timestamp == s.timestamp => *last = s,
                _ => out.push(s),
            }
        }
        Self { samples: out }
    }

    /// Evenly spaced samples starting at `start`.
    pub fn from_values(start: DateTime<Utc>, step: Duration, values: &[f64]) -> Self {
        let mut t = start;
        let mut samples = Vec::with_capacity(values.len());
        for &watts in values {
            samples.push(PowerSample::new(t, watts));
            t += step;
        }
        Self::from_unsorted(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PowerSample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &PowerSample> {
        self.samples.iter()
    }

    pub fn first(&self) -> Option<&PowerSample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&PowerSample> {
        self.samples.last()
    }

    /// Samples with `from <= timestamp < to`.
    pub fn slice(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> TimeSeries {
        let lo = self.samples.partition_point(|s| s.timestamp < from);
        let hi = self.samples.partition_point(|s| s.timestamp < to).max(lo);
        Self {
            samples: self.samples[lo..hi].to_vec(),
        }
    }

    /// Samples with `from <= timestamp <= to`.
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> TimeSeries {
        let lo = self.samples.partition_point(|s| s.timestamp < from);
        let hi = self.samples.partition_point(|s| s.timestamp <= to).max(lo);
        Self {
            samples: self.samples[lo..hi].to_vec(),
        }
    }

    /// Latest sample at or before `t`.
    pub fn last_before(&self, t: DateTime<Utc>) -> Option<&PowerSample> {
        let idx = self.samples.partition_point(|s| s.timestamp <= t);
        idx.checked_sub(1).map(|i| &self.samples[i])
    }

    /// Applies `f` to every value, keeping timestamps.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> TimeSeries {
        Self::from_unsorted(
            self.samples
                .iter()
                .map(|s| PowerSample::new(s.timestamp, f(s.watts)))
                .collect(),
        )
    }

    /// Arithmetic mean of the sample values.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when there are no samples.
    pub fn mean(&self) -> Result<f64, SeriesError> {
        if self.samples.is_empty() {
            return Err(SeriesError::Empty);
        }
        let sum: f64 = self.samples.iter().map(|s| s.watts).sum();
        Ok(sum / self.samples.len() as f64)
    }

    /// Largest sample value.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when there are no samples.
    pub fn max(&self) -> Result<f64, SeriesError> {
        self.samples
            .iter()
            .map(|s| s.watts)
            .reduce(f64::max)
            .ok_or(SeriesError::Empty)
    }

    /// Value at `t`, interpolated linearly between the neighbouring samples.
    ///
    /// `None` outside the span of the samples.
    pub fn value_at(&self, t: DateTime<Utc>) -> Option<f64> {
        let idx = self.samples.partition_point(|s| s.timestamp <= t);
        let before = self.samples.get(idx.checked_sub(1)?)?;
        if before.timestamp == t {
            return Some(before.watts);
        }
        let after = self.samples.get(idx)?;
        let frac = (t - before.timestamp).num_milliseconds() as f64
            / (after.timestamp - before.timestamp).num_milliseconds() as f64;
        Some(before.watts + (after.watts - before.watts) * frac)
    }

    /// Trapezoidal integral between the first and last sample, in watt-hours.
    ///
    /// A single sample spans no time and integrates to zero.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when there are no samples.
    pub fn integrate_wh(&self) -> Result<f64, SeriesError> {
        if self.samples.is_empty() {
            return Err(SeriesError::Empty);
        }
        Ok(self
            .samples
            .windows(2)
            .map(|w| trapezoid_wh((w[0].timestamp, w[0].watts), (w[1].timestamp, w[1].watts)))
            .sum())
    }

    /// Trapezoidal integral over `[from, to]`, in watt-hours.
    ///
    /// The ends are interpolated, so adjacent ranges add up to the integral over their
    /// union. Time outside the span of the samples contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when there are no samples.
    pub fn integrate_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, SeriesError> {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return Err(SeriesError::Empty);
        };
        let lo = from.max(first.timestamp);
        let hi = to.min(last.timestamp);
        let (Some(v_lo), Some(v_hi)) = (self.value_at(lo), self.value_at(hi)) else {
            return Ok(0.0);
        };
        if hi <= lo {
            return Ok(0.0);
        }
        let inner_lo = self.samples.partition_point(|s| s.timestamp <= lo);
        let inner_hi = self.samples.partition_point(|s| s.timestamp < hi);
        let mut prev = (lo, v_lo);
        let mut wh = 0.0;
        for s in &self.samples[inner_lo..inner_hi.max(inner_lo)] {
            let point = (s.timestamp, s.watts);
            wh += trapezoid_wh(prev, point);
            prev = point;
        }
        Ok(wh + trapezoid_wh(prev, (hi, v_hi)))
    }

    /// Buckets every wall-clock period from the first sample to the last.
    ///
    /// Periods without samples inside the span are kept with `sample_count == 0` and
    /// the interpolated energy across the gap.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] when there are no samples.
    pub fn resample(
        &self,
        width: BucketWidth,
        clock: &WallClock,
    ) -> Result<Vec<Resampled>, SeriesError> {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return Err(SeriesError::Empty);
        };
        Ok(self.resample_periods(&clock.periods(first.timestamp, last.timestamp, width)))
    }

    /// Buckets the series over the given `(start, end)` periods.
    ///
    /// A period with a single sample and no span reports that sample's value as its
    /// mean. Periods outside the samples are all zero.
    pub fn resample_periods(&self, periods: &[(DateTime<Utc>, DateTime<Utc>)]) -> Vec<Resampled> {
        periods
            .iter()
            .map(|&(start, end)| {
                let lo = self.samples.partition_point(|s| s.timestamp < start);
                let hi = self.samples.partition_point(|s| s.timestamp < end).max(lo);
                let inside = &self.samples[lo..hi];
                let covered = match (self.samples.first(), self.samples.last()) {
                    (Some(first), Some(last)) => {
                        let from = start.max(first.timestamp);
                        let to = end.min(last.timestamp);
                        (to > from).then_some((from, to))
                    }
                    _ => None,
                };
                let (energy_wh, mean_w) = match (covered, inside.last()) {
                    (Some((from, to)), _) => {
                        let wh = self.integrate_between(from, to).unwrap_or(0.0);
                        (wh, wh / hours(from, to))
                    }
                    (None, Some(only)) => (0.0, only.watts),
                    (None, None) => (0.0, 0.0),
                };
                Resampled {
                    period_start: start,
                    period_end: end,
                    mean_w,
                    sample_count: inside.len(),
                    energy_wh,
                }
            })
            .collect()
    }
}
