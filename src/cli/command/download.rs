//! The `download` command: reconcile the download folder against the
//! calendar and fetch whatever is missing, without aggregating anything.

use std::path::PathBuf;
use std::time::Instant;

use crate::cli::DownloadArgs;
use crate::dates;
use crate::error::Result;
use crate::fetch::default_download_folder;

use super::{parse_before, reconcile, resolve_njobs};

pub async fn download(args: &DownloadArgs) -> Result<PathBuf> {
    let start = Instant::now();

    let njobs = resolve_njobs(args.njobs);
    let before_date = parse_before(args.before.as_deref())?;
    let years: Vec<i32> = (args.start_year..=args.end_year).collect();
    let download_folder = args
        .download_folderpath
        .clone()
        .unwrap_or_else(|| default_download_folder(args.product));

    println!("--- inputs ---");
    println!("start_year: {}", args.start_year);
    println!("end_year: {}", args.end_year);
    println!("product: {}", args.product);
    println!("download_folderpath: {}", download_folder.display());
    println!("before_date: {}", before_date);
    println!("njobs: {}", njobs);

    println!("--- run ---");
    let outcome = reconcile(
        &years,
        args.product,
        None,
        &download_folder,
        before_date,
        njobs,
        args.overwrite,
    )
    .await?;

    dates::verify_coverage(
        &outcome.catalogue.dates(),
        &years,
        args.product.first_date(),
        before_date,
        args.missing_dates,
    )?;

    println!(
        "Catalogue holds {} files ({} downloaded this run, {} corrupted filtered)",
        outcome.catalogue.len(),
        outcome.downloaded,
        outcome.corrupted
    );
    println!("--- {:.2} seconds ---", start.elapsed().as_secs_f64());

    Ok(download_folder)
}
