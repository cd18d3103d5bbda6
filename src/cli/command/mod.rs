pub mod csv;
pub mod download;

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{Local, NaiveDate};

pub use self::csv::csv;
pub use self::download::download;

use crate::catalogue::{Catalogue, Source};
use crate::cli::{create_progress_bar, create_spinner};
use crate::corruption;
use crate::dates;
use crate::error::{Error, Result};
use crate::fetch::{ChcClient, Product, RemoteFile};

/// The documented pool-size default: host parallelism minus two, never
/// below one.
pub fn default_njobs() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(2).max(1)
}

/// Resolves the `--njobs` argument; `-1` and `0` select the default.
pub fn resolve_njobs(njobs: i64) -> usize {
    if njobs <= 0 {
        default_njobs()
    } else {
        njobs as usize
    }
}

/// Resolves the `--before` argument; unset and `today` mean today.
pub fn parse_before(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        None => Ok(Local::now().date_naive()),
        Some(s) if s.eq_ignore_ascii_case("today") => Ok(Local::now().date_naive()),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            Error::Configuration(format!(
                "invalid before date `{}`; expected YYYY-MM-DD or `today`",
                s
            ))
        }),
    }
}

/// The reconciled catalogue plus the counts the commands report.
pub struct Reconciliation {
    pub catalogue: Catalogue,
    pub corrupted: usize,
    pub downloaded: usize,
}

/// Builds the authoritative local catalogue, fetches what is missing and
/// merges the result: the shared front half of both commands.
pub async fn reconcile(
    years: &[i32],
    product: Product,
    archive_folder: Option<&Path>,
    download_folder: &Path,
    before_date: NaiveDate,
    njobs: usize,
    overwrite: bool,
) -> Result<Reconciliation> {
    println!("Creating CHIRPS local catalogue.");

    let mut archive_cat = match archive_folder {
        Some(folder) => Catalogue::scan(folder, Source::Archive)?,
        None => Catalogue::empty(),
    };
    archive_cat.retain_years(years);
    let mut chc_cat = Catalogue::scan(download_folder, Source::Remote)?;
    chc_cat.retain_years(years);

    let bar = create_spinner("Checking rasters for corruption...".to_string());
    corruption::classify_catalogue(&mut archive_cat, njobs)?;
    corruption::classify_catalogue(&mut chc_cat, njobs)?;
    // The archive claims its dates even where the copy is corrupt; a remote
    // copy never supersedes an archive date in the merged catalogue.
    let archive_claimed: BTreeSet<NaiveDate> = archive_cat.dates().into_iter().collect();
    let (archive_valid, archive_bad) = corruption::split_valid(archive_cat);
    let (chc_valid, chc_bad) = corruption::split_valid(chc_cat);
    let corrupted = archive_bad.len() + chc_bad.len();
    bar.finish_with_message(format!("{} corrupted rasters filtered out", corrupted));

    let mut valid_dates = archive_valid.dates();
    valid_dates.extend(chc_valid.dates());
    let missing = dates::missing_dates(&valid_dates, years, product.first_date(), before_date);

    let mut chc_fresh = chc_valid;
    chc_fresh.retain_dates_not_in(&archive_claimed);
    let local = Catalogue::merge_preferring(archive_valid, chc_fresh);

    let mut downloads = Catalogue::empty();
    if !missing.is_empty() {
        let missing_years = dates::missing_years(&missing);
        println!(
            "Querying CHC for {} CHIRPS files for missing years {:?}",
            product, missing_years
        );

        let client = ChcClient::new();
        let listed = client.list(product, &missing_years).await?;

        let held: BTreeSet<NaiveDate> = valid_dates.into_iter().collect();
        let pending: Vec<RemoteFile> = listed
            .into_iter()
            .filter(|f| !held.contains(&f.date))
            .collect();

        if !pending.is_empty() {
            println!("Number of files that need to be downloaded: {}", pending.len());
            let bar = create_progress_bar(
                pending.len() as u64,
                "Downloading CHIRPS files".to_string(),
            );
            downloads = client
                .download(&pending, download_folder, overwrite, njobs, &bar)
                .await?;
            bar.finish_with_message("Downloads complete");
        }
    }

    let downloaded = downloads.len();
    let mut catalogue = Catalogue::merge_preferring(local, downloads);
    catalogue.clamp_before(before_date);

    Ok(Reconciliation {
        catalogue,
        corrupted,
        downloaded,
    })
}

// -- Tests -------------------------------------------------------------------
