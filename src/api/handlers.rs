//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use tracing::warn;

use super::AppState;
use super::types::{
    BucketsResponse, ErrorResponse, FlowResponse, LedgerResponse, SnapshotQuery, SummaryResponse,
};
use crate::engine::pipeline::{Snapshot, Window};
use crate::error::{Error, SeriesError};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Resolves the window and policy from the query and refreshes a snapshot.
async fn snapshot(state: &AppState, query: &SnapshotQuery) -> Result<Snapshot, ApiError> {
    let clock = state.engine.clock();
    let now = query.now.or(state.now).unwrap_or_else(Utc::now);
    let window = match query.hours {
        Some(h) if h <= 0 => {
            return Err(error(
                StatusCode::BAD_REQUEST,
                format!("`hours` ({h}) must be > 0"),
            ));
        }
        Some(h) => Window::trailing_hours(now, h, clock),
        None => Window::today(now, clock),
    };
    let mut policy = state.engine.default_policy();
    if let Some(fees) = query.fees {
        policy = policy.with_fees(fees);
    }

    let _guard = state.refresh_lock.lock().await;
    state.engine.refresh(window, policy).map_err(|e| match e {
        Error::Series(SeriesError::Empty) => error(
            StatusCode::NOT_FOUND,
            format!("no telemetry between {} and {}", window.from, window.now),
        ),
        other => {
            warn!(error = %other, "refresh failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    })
}

/// `GET /summary` → 200 + `SummaryResponse` JSON
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let snap = snapshot(&state, &query).await?;
    Ok(Json(SummaryResponse {
        window: snap.window,
        policy: snap.policy,
        summary: snap.summary,
    }))
}

/// `GET /flow` → 200 + `FlowResponse` JSON
pub async fn get_flow(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<FlowResponse>, ApiError> {
    let snap = snapshot(&state, &query).await?;
    let flagged = snap.flows.iter().filter(|f| !f.is_reconciled()).count();
    Ok(Json(FlowResponse {
        window: snap.window,
        instants: snap.flows.len(),
        flagged,
        latest: snap.flows.last().cloned(),
    }))
}

/// `GET /buckets` → 200 + `BucketsResponse` JSON
pub async fn get_buckets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<BucketsResponse>, ApiError> {
    let snap = snapshot(&state, &query).await?;
    Ok(Json(BucketsResponse {
        window: snap.window,
        bucket_width: snap.bucket_width,
        series: snap.buckets,
    }))
}

/// `GET /ledger` → 200 + `LedgerResponse` JSON
pub async fn get_ledger(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let snap = snapshot(&state, &query).await?;
    let totals = snap.ledger.totals();
    Ok(Json(LedgerResponse {
        window: snap.window,
        policy: snap.policy,
        hourly: snap.ledger.entries,
        daily: snap.daily,
        totals,
    }))
}
