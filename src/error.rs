//! Error taxonomy for the engine and its collaborators.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::clock::BucketWidth;
use crate::engine::types::{Channel, FlowComponent};

/// Failures of aggregate operations on a [`TimeSeries`](crate::engine::series::TimeSeries).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    /// No samples in the requested window. Callers treat this as "no data yet", never as zero.
    #[error("no samples available")]
    Empty,
    /// Input samples were not strictly ascending by timestamp.
    #[error("sample at {at} is not after its predecessor")]
    Unordered { at: DateTime<Utc> },
    /// A sample carried NaN or an infinite value.
    #[error("sample at {at} is not a finite number")]
    NonFinite { at: DateTime<Utc> },
}

/// Diagnostic attached to a flow decomposition that could not be balanced cleanly.
///
/// These are flags, not raised errors: sensor noise produces them routinely and the
/// decomposition is still emitted (clamped) alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationFailure {
    /// A component came out negative and was clamped to zero.
    #[error("{component} came out at {value_w:.1} W and was clamped to zero")]
    NegativeComponent {
        component: FlowComponent,
        value_w: f64,
    },
    /// Supply and demand sides differ by more than the balance tolerance.
    #[error("flows do not balance: residual {residual_w:.1} W")]
    Unbalanced { residual_w: f64 },
}

/// Tariff lookup failures. Both variants exclude the bucket from cost totals only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TariffError {
    /// The hour lies inside the price table's coverage but has no node.
    #[error("no price node for the hour starting {period_start}")]
    NoPriceForPeriod { period_start: DateTime<Utc> },
    /// The hour lies outside the hours the price lists cover (e.g. after midnight before refetch).
    #[error("price lists do not cover the hour starting {period_start}")]
    StalePriceWindow { period_start: DateTime<Utc> },
}

impl TariffError {
    /// Start of the hour that could not be priced.
    pub fn period_start(&self) -> DateTime<Utc> {
        match self {
            Self::NoPriceForPeriod { period_start } | Self::StalePriceWindow { period_start } => {
                *period_start
            }
        }
    }
}

/// Failures reported by injected telemetry or price collaborators.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("telemetry unavailable for {channel}: {message}")]
    Telemetry { channel: Channel, message: String },
    #[error("price data unavailable: {0}")]
    Prices(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Costs were requested for buckets that do not line up with hourly prices.
    #[error("costs are attributed per hour, not per {width}")]
    NotHourly { width: BucketWidth },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
