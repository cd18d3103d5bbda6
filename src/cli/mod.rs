//! Command line interface.

pub mod command;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::aggregate::Aggregation;
use crate::coregister::Resampling;
use crate::dates::MissingDatesPolicy;
use crate::fetch::Product;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the local catalogue, fetch missing dates and export a CSV
    /// of per-date regional aggregates
    Csv(CsvArgs),
    /// Download missing CHIRPS files for a year range
    Download(DownloadArgs),
}

#[derive(Args)]
pub struct CsvArgs {
    /// Path to the region-of-interest polygons (any GDAL-readable vector format)
    pub roi_filepath: PathBuf,

    /// Start year for fetching the CHIRPS data, inclusive. Format: YYYY
    pub start_year: i32,

    /// End year for fetching the CHIRPS data, inclusive. Format: YYYY
    pub end_year: i32,

    /// Filepath where the output csv is to be stored
    pub export_filepath: PathBuf,

    /// CHIRPS product to be fetched
    #[arg(short, long, value_enum, default_value_t = Product::P05)]
    pub product: Product,

    /// Path to the folder where files will be downloaded to
    /// [default: <data-dir>/chirps/chc/<product>]
    #[arg(short, long)]
    pub download_folderpath: Option<PathBuf>,

    /// Folderpath where archive data is stored. Files present in the
    /// archive folder will not be re-downloaded
    #[arg(short = 'g', long)]
    pub archive_folderpath: Option<PathBuf>,

    /// Aggregation method to reduce CHIRPS values for a region to a single value
    #[arg(short, long, value_enum, default_value_t = Aggregation::Mean)]
    pub aggregation: Aggregation,

    /// Resampling kernel used when coregistering remote deliveries
    #[arg(long, value_enum, default_value_t = Resampling::Nearest)]
    pub resampling: Resampling,

    /// Number of workers for parallel downloads and computation;
    /// -1 or 0 selects host parallelism minus two
    #[arg(short = 'j', long, default_value_t = -1)]
    pub njobs: i64,

    /// Re-download files that already exist locally
    #[arg(long)]
    pub overwrite: bool,

    /// Date up to which to query the files for. Options: [YYYY-MM-DD | today]
    #[arg(short, long)]
    pub before: Option<String>,

    /// What to do when dates are still missing after reconciliation
    #[arg(long, value_enum, default_value_t = MissingDatesPolicy::Raise)]
    pub missing_dates: MissingDatesPolicy,

    /// Folder for transient decompressed rasters [default: a scoped temp dir]
    #[arg(short, long)]
    pub working_folderpath: Option<PathBuf>,
}

#[derive(Args)]
pub struct DownloadArgs {
    /// Start year for fetching the CHIRPS data, inclusive. Format: YYYY
    pub start_year: i32,

    /// End year for fetching the CHIRPS data, inclusive. Format: YYYY
    pub end_year: i32,

    /// CHIRPS product to be fetched
    #[arg(short, long, value_enum, default_value_t = Product::P05)]
    pub product: Product,

    /// Path to the folder where files will be downloaded to
    /// [default: <data-dir>/chirps/chc/<product>]
    #[arg(short, long)]
    pub download_folderpath: Option<PathBuf>,

    /// Number of workers for parallel downloads and computation;
    /// -1 or 0 selects host parallelism minus two
    #[arg(short = 'j', long, default_value_t = -1)]
    pub njobs: i64,

    /// Date up to which to query the files for. This avoids remote requests
    /// when everything before the given date is already present.
    /// Options: [YYYY-MM-DD | today]
    #[arg(short, long)]
    pub before: Option<String>,

    /// Re-download files that already exist locally
    #[arg(long)]
    pub overwrite: bool,

    /// What to do when dates are still missing after reconciliation
    #[arg(long, value_enum, default_value_t = MissingDatesPolicy::Raise)]
    pub missing_dates: MissingDatesPolicy,
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {msg}")
            .unwrap()
            .progress_chars("##-"),
    )
}
