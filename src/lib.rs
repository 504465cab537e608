//! Energy flow reconciliation and tariff attribution for a home energy dashboard.

pub mod adapters;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
/// Reconciliation, aggregation, and pricing pipeline.
pub mod engine;
pub mod error;
/// CSV and JSON import/export.
pub mod io;
pub mod sources;
/// Seeded synthetic telemetry and price days for demos and tests.
pub mod synthetic;
