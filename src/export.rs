//! Writes the aggregated table to a CSV file.

use std::fs;
use std::path::Path;

use crate::aggregate::{AggregateRow, Aggregation};
use crate::error::Result;

/// Writes one row per resolved date: `date, year, day, <aggregation> CHIRPS`.
/// An undefined aggregate (all pixels no-data) becomes an empty cell.
pub fn write_csv(rows: &[AggregateRow], aggregation: Aggregation, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let label = format!("{} CHIRPS", aggregation.label());
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["date", "year", "day", label.as_str()])?;

    for row in rows {
        let value = if row.value.is_nan() {
            String::new()
        } else {
            row.value.to_string()
        };
        writer.write_record([
            row.date.format("%Y-%m-%d").to_string(),
            row.year.to_string(),
            row.day_of_year.to_string(),
            value,
        ])?;
    }

    writer.flush()?;
    Ok(())
}

// -- Tests -------------------------------------------------------------------
