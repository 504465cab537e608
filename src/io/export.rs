//! CSV export for ledger entries and energy buckets.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::engine::ledger::CostLedgerEntry;
use crate::engine::pipeline::SeriesBuckets;

/// Column header for ledger export.
const LEDGER_HEADER: &str = "period_start,period_end,partial,consumed_wh,produced_wh,\
                             import_wh,export_wh,net_grid_wh,self_used_wh,import_cost,\
                             export_gain,net_cost,self_use_avoided_import,self_use_forgone_export,\
                             price_total,price_error";

/// Column header for bucket export.
const BUCKET_HEADER: &str = "series,period_start,period_end,partial,sample_count,mean_w,energy_wh";

/// Exports ledger entries to a CSV file at the given path.
///
/// Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_ledger(entries: &[CostLedgerEntry], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_ledger_csv(entries, io::BufWriter::new(file))
}

/// Writes ledger entries as CSV to any writer.
///
/// Unpriced entries leave `price_total` empty and name the lookup failure in
/// `price_error`.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_ledger_csv(entries: &[CostLedgerEntry], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(LEDGER_HEADER.split(',').map(str::trim))?;

    for e in entries {
        wtr.write_record(&[
            e.period_start.to_rfc3339(),
            e.period_end.to_rfc3339(),
            e.is_partial.to_string(),
            format!("{:.3}", e.consumed_wh),
            format!("{:.3}", e.produced_wh),
            format!("{:.3}", e.import_wh),
            format!("{:.3}", e.export_wh),
            format!("{:.3}", e.net_grid_wh),
            format!("{:.3}", e.self_used_wh),
            format!("{:.4}", e.import_cost),
            format!("{:.4}", e.export_gain),
            format!("{:.4}", e.net_cost),
            format!("{:.4}", e.self_use.avoided_import_cost),
            format!("{:.4}", e.self_use.forgone_export_gain),
            e.price
                .as_ref()
                .map(|p| format!("{:.4}", p.total_per_kwh))
                .unwrap_or_default(),
            e.price_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes display buckets for every series as CSV, one row per bucket.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_buckets_csv(series: &[SeriesBuckets], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(BUCKET_HEADER.split(','))?;

    for s in series {
        for b in &s.buckets {
            wtr.write_record(&[
                s.series.to_string(),
                b.period_start.to_rfc3339(),
                b.period_end.to_rfc3339(),
                b.is_partial.to_string(),
                b.sample_count.to_string(),
                format!("{:.3}", b.mean_w),
                format!("{:.3}", b.energy_wh),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
