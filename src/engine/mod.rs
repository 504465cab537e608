/// Energy bucketing of power series.
pub mod aggregate;
/// Wall-clock bucket boundaries in a configured time zone.
pub mod clock;
pub mod ledger;
pub mod pipeline;
/// Per-instant flow decomposition.
pub mod reconcile;
pub mod series;
pub mod summary;
/// Hourly price matching and tariff policy.
pub mod tariff;
pub mod types;
