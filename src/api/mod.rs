//! Read-only JSON view of refresh snapshots.
//!
//! Provides four GET endpoints, each recomputing a snapshot for the requested window:
//! - `/summary`: headline totals, costs, and self-use value
//! - `/flow`: latest reconciled decomposition for the live gauge
//! - `/buckets`: display buckets for every measured channel and flow component
//! - `/ledger`: hourly and daily priced ledger
//!
//! All endpoints accept `?fees=<bool>`, `?now=<rfc3339>`, and `?hours=<n>`.

mod handlers;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::engine::pipeline::Engine;
use crate::sources::{MemoryPrices, MemoryTelemetry};

/// Application state shared across all request handlers.
///
/// The engine is immutable; `refresh_lock` serialises refreshes so concurrent requests
/// for the same period fetch from the sources one at a time.
pub struct AppState {
    pub engine: Engine<MemoryTelemetry, MemoryPrices>,
    /// Evaluation instant used when a request does not pass `now`.
    pub now: Option<DateTime<Utc>>,
    refresh_lock: Mutex<()>,
}

impl AppState {
    pub fn new(engine: Engine<MemoryTelemetry, MemoryPrices>, now: Option<DateTime<Utc>>) -> Self {
        Self {
            engine,
            now,
            refresh_lock: Mutex::new(()),
        }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/summary", get(handlers::get_summary))
        .route("/flow", get(handlers::get_flow))
        .route("/buckets", get(handlers::get_buckets))
        .route("/ledger", get(handlers::get_ledger))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process exits.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
