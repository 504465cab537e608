use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Nominal width of an energy bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketWidth {
    Minute,
    Hour,
    Day,
}

impl BucketWidth {
    /// Nominal duration. Day buckets may actually be 23 h or 25 h across DST changes.
    pub fn nominal(self) -> Duration {
        match self {
            BucketWidth::Minute => Duration::minutes(1),
            BucketWidth::Hour => Duration::hours(1),
            BucketWidth::Day => Duration::days(1),
        }
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BucketWidth::Minute => "minute",
            BucketWidth::Hour => "hour",
            BucketWidth::Day => "day",
        })
    }
}

/// Maps instants onto local wall-clock bucket boundaries.
///
/// Minute and hour buckets are floored in local time using the UTC offset in force at
/// the instant, so zones with half-hour offsets still get buckets starting at local
/// `:00`. Day buckets start at local midnight.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use energy_ledger::engine::clock::{BucketWidth, WallClock};
///
/// let clock = WallClock::new(chrono_tz::Asia::Kolkata);
/// let t = Utc.with_ymd_and_hms(2024, 1, 10, 6, 10, 0).unwrap(); // 11:40 local
/// let start = clock.floor(t, BucketWidth::Hour);
/// assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 10, 5, 30, 0).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    tz: Tz,
}

impl WallClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: Tz::UTC }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// The instant expressed in local time.
    pub fn local(&self, t: DateTime<Utc>) -> DateTime<Tz> {
        t.with_timezone(&self.tz)
    }

    fn offset_secs(&self, t: DateTime<Utc>) -> i64 {
        i64::from(
            self.tz
                .offset_from_utc_datetime(&t.naive_utc())
                .fix()
                .local_minus_utc(),
        )
    }

    /// Floors `t` in local time to a multiple of `step_secs`.
    fn floor_local(&self, t: DateTime<Utc>, step_secs: i64) -> DateTime<Utc> {
        let off = self.offset_secs(t);
        let local = t.timestamp() + off;
        let floored = local.div_euclid(step_secs) * step_secs - off;
        DateTime::from_timestamp(floored, 0).unwrap_or(t)
    }

    fn local_midnight(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|d| d.with_timezone(&Utc))
    }

    /// Start of the bucket of `width` that contains `t`.
    pub fn floor(&self, t: DateTime<Utc>, width: BucketWidth) -> DateTime<Utc> {
        match width {
            BucketWidth::Minute | BucketWidth::Hour => {
                self.floor_local(t, width.nominal().num_seconds())
            }
            BucketWidth::Day => {
                let date = self.local(t).date_naive();
                match self.local_midnight(date) {
                    Some(start) if start <= t => start,
                    _ => self.floor_local(t, BucketWidth::Day.nominal().num_seconds()),
                }
            }
        }
    }

    /// End of the bucket that starts at `start`.
    pub fn next_boundary(&self, start: DateTime<Utc>, width: BucketWidth) -> DateTime<Utc> {
        match width {
            BucketWidth::Minute | BucketWidth::Hour => start + width.nominal(),
            BucketWidth::Day => {
                let next = self
                    .local(start)
                    .date_naive()
                    .succ_opt()
                    .and_then(|d| self.local_midnight(d));
                match next {
                    Some(end) if end > start => end,
                    _ => start + width.nominal(),
                }
            }
        }
    }

    /// Consecutive `(start, end)` buckets from the one containing `from` up to and
    /// including the one containing `until`. Empty when `until < from`.
    pub fn periods(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        width: BucketWidth,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let mut periods = Vec::new();
        if until < from {
            return periods;
        }
        let mut start = self.floor(from, width);
        while start <= until {
            let end = self.next_boundary(start, width);
            periods.push((start, end));
            start = end;
        }
        periods
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::utc()
    }
}
