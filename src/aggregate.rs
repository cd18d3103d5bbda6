//! Aggregation engine: reduces each catalogued raster to a single scalar
//! for the region of interest, in parallel over the catalogue.

use std::path::Path;

use chrono::NaiveDate;
use clap::ValueEnum;
use indicatif::ProgressBar;
use ndarray::Array2;
use rayon::prelude::*;

use crate::catalogue::{Catalogue, CatalogueRecord};
use crate::coregister::Resampling;
use crate::error::Result;
use crate::raster::{self, LoadContext, CHIRPS_NODATA};
use crate::roi::Roi;

/// The reducer applied to a raster's pixels. A closed set: unknown names
/// are rejected at argument-parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
    Centre,
}

impl Aggregation {
    pub fn label(self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Centre => "centre",
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One output-table row.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub date: NaiveDate,
    pub year: i32,
    pub day_of_year: u32,
    pub value: f64,
}

pub struct AggregateOptions<'a> {
    pub roi: &'a Roi,
    pub reference: Option<&'a Path>,
    pub working_dir: &'a Path,
    pub aggregation: Aggregation,
    pub resampling: Resampling,
    pub njobs: usize,
}

/// Reduces every record to a row, preserving catalogue order. A failure in
/// any worker aborts the whole batch.
pub fn aggregate_catalogue(
    catalogue: &Catalogue,
    options: &AggregateOptions,
    progress: &ProgressBar,
) -> Result<Vec<AggregateRow>> {
    // The centre reducer picks a flattened midpoint, which is only
    // meaningful over the ROI's bounding envelope.
    let envelope;
    let roi = match options.aggregation {
        Aggregation::Centre => {
            envelope = options.roi.envelope();
            &envelope
        }
        _ => options.roi,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.njobs.max(1))
        .build()?;

    pool.install(|| {
        catalogue
            .records()
            .par_iter()
            .map(|record| {
                let value = aggregate_record(record, roi, options)?;
                progress.inc(1);
                Ok(AggregateRow {
                    date: record.date,
                    year: record.year,
                    day_of_year: record.day_of_year,
                    value,
                })
            })
            .collect()
    })
}

fn aggregate_record(
    record: &CatalogueRecord,
    roi: &Roi,
    options: &AggregateOptions,
) -> Result<f64> {
    let ctx = LoadContext {
        roi: Some(roi),
        reference: options.reference,
        working_dir: options.working_dir,
        resampling: options.resampling,
    };

    let mut data = raster::load(&record.path, record.file_type, record.load_method, &ctx)?;
    prepare(&mut data, record.multiplier);

    Ok(reduce(&data, options.aggregation))
}

/// Applies the record's unit multiplier, then maps the no-data sentinel to
/// NaN so the numeric reducers skip it.
fn prepare(data: &mut Array2<f64>, multiplier: f64) {
    *data *= multiplier;
    data.mapv_inplace(|v| if v == CHIRPS_NODATA { f64::NAN } else { v });
}

fn reduce(data: &Array2<f64>, aggregation: Aggregation) -> f64 {
    match aggregation {
        Aggregation::Mean => nan_mean(data),
        Aggregation::Median => nan_median(data),
        Aggregation::Centre => centre_value(data),
    }
}

fn nan_mean(data: &Array2<f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in data.iter().filter(|v| !v.is_nan()) {
        sum += v;
        count += 1;
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn nan_median(data: &Array2<f64>) -> f64 {
    let mut values: Vec<f64> = data.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// The pixel at the flattened row-major midpoint index.
fn centre_value(data: &Array2<f64>) -> f64 {
    data.iter().nth(data.len() / 2).copied().unwrap_or(f64::NAN)
}

// -- Tests -------------------------------------------------------------------
