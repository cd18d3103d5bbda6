//! The `csv` command: reconcile the catalogue, fetch missing dates, reduce
//! every raster to one value for the region of interest and export a CSV.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use tempfile::TempDir;

use crate::aggregate::{self, AggregateOptions};
use crate::catalogue::Source;
use crate::cli::{create_progress_bar, CsvArgs};
use crate::dates;
use crate::error::Result;
use crate::export;
use crate::fetch::default_download_folder;
use crate::raster::{self, Raster};
use crate::roi::Roi;

use super::{parse_before, reconcile, resolve_njobs};

pub async fn csv(args: &CsvArgs) -> Result<PathBuf> {
    let start = Instant::now();

    let njobs = resolve_njobs(args.njobs);
    let before_date = parse_before(args.before.as_deref())?;
    let years: Vec<i32> = (args.start_year..=args.end_year).collect();
    let download_folder = args
        .download_folderpath
        .clone()
        .unwrap_or_else(|| default_download_folder(args.product));

    let outcome = reconcile(
        &years,
        args.product,
        args.archive_folderpath.as_deref(),
        &download_folder,
        before_date,
        njobs,
        args.overwrite,
    )
    .await?;
    let mut catalogue = outcome.catalogue;

    dates::verify_coverage(
        &catalogue.dates(),
        &years,
        args.product.first_date(),
        before_date,
        args.missing_dates,
    )?;

    // The first valid archive raster defines the reference grid; without
    // one, compressed deliveries are read on their native grid.
    let reference = catalogue
        .records()
        .iter()
        .find(|r| r.source == Source::Archive)
        .map(|r| r.path.clone());
    catalogue.assign_load_methods(reference.is_some());

    let target_wkt = match catalogue.records().first() {
        Some(record) => Some(Raster::read_projection(&raster::gdal_path(
            &record.path,
            record.file_type,
        ))?),
        None => None,
    };
    let roi = Roi::from_vector_file(&args.roi_filepath, target_wkt.as_deref())?;

    // Scoped working folder for transient decompressed rasters; removed
    // recursively when it goes out of scope.
    let working_dir = match &args.working_folderpath {
        Some(path) => {
            fs::create_dir_all(path)?;
            tempfile::Builder::new().prefix("chirps-").tempdir_in(path)?
        }
        None => TempDir::new()?,
    };

    println!("Reading tifs and generating csv");
    let bar = create_progress_bar(catalogue.len() as u64, "Aggregating rasters".to_string());
    let options = AggregateOptions {
        roi: &roi,
        reference: reference.as_deref(),
        working_dir: working_dir.path(),
        aggregation: args.aggregation,
        resampling: args.resampling,
        njobs,
    };
    let rows = aggregate::aggregate_catalogue(&catalogue, &options, &bar)?;
    bar.finish_with_message("Aggregation complete");

    export::write_csv(&rows, args.aggregation, &args.export_filepath)?;

    println!(
        "{} rows written ({} corrupted rasters filtered, {} files downloaded)",
        rows.len(),
        outcome.corrupted,
        outcome.downloaded
    );
    println!("--- {:.2} seconds ---", start.elapsed().as_secs_f64());

    Ok(args.export_filepath.clone())
}
