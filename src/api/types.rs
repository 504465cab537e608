//! API response and query types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::clock::BucketWidth;
use crate::engine::ledger::{CostLedgerEntry, LedgerTotals};
use crate::engine::pipeline::{SeriesBuckets, Window};
use crate::engine::summary::Summary;
use crate::engine::tariff::TariffPolicy;
use crate::engine::types::FlowDecomposition;

/// Query parameters shared by every snapshot endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Overrides the configured fees-and-taxes toggle.
    pub fees: Option<bool>,
    /// Evaluation instant; defaults to the server's fixed instant or the wall clock.
    pub now: Option<DateTime<Utc>>,
    /// Trailing whole hours instead of the local day so far.
    pub hours: Option<i64>,
}

/// `GET /summary`
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub window: Window,
    pub policy: TariffPolicy,
    pub summary: Summary,
}

/// `GET /flow`: the live gauge reading.
#[derive(Debug, Serialize)]
pub struct FlowResponse {
    pub window: Window,
    pub latest: Option<FlowDecomposition>,
    /// Reconciled instants in the window.
    pub instants: usize,
    /// Instants carrying a reconciliation diagnostic.
    pub flagged: usize,
}

/// `GET /buckets`
#[derive(Debug, Serialize)]
pub struct BucketsResponse {
    pub window: Window,
    pub bucket_width: BucketWidth,
    pub series: Vec<SeriesBuckets>,
}

/// `GET /ledger`
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub window: Window,
    pub policy: TariffPolicy,
    pub hourly: Vec<CostLedgerEntry>,
    pub daily: Vec<CostLedgerEntry>,
    pub totals: LedgerTotals,
}

/// JSON error body returned for 4xx/5xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
