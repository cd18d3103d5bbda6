//! Remote fetch adapter: lists and downloads CHIRPS files from the CHC
//! data host for the years the resolver reports missing.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use clap::ValueEnum;
use futures::StreamExt;
use indicatif::ProgressBar;
use regex::Regex;

use crate::catalogue::{parse_remote_filename, Catalogue, CatalogueRecord, Source};
use crate::error::{Error, Result};

pub const CHC_BASE_URL: &str = "https://data.chc.ucsb.edu/products/CHIRPS-2.0";

/// CHIRPS product line. Determines the earliest date the product can exist
/// and where the daily tifs live on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Product {
    /// Final 0.05-degree product, available from 1981.
    #[default]
    P05,
    /// Preliminary product, available from 2015.
    Prelim,
}

impl Product {
    pub fn first_date(self) -> NaiveDate {
        match self {
            Product::P05 => NaiveDate::from_ymd_opt(1981, 1, 1).unwrap(),
            Product::Prelim => NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Product::P05 => "p05",
            Product::Prelim => "prelim",
        }
    }

    fn listing_url(self, year: i32) -> String {
        match self {
            Product::P05 => format!("{}/global_daily/tifs/p05/{}/", CHC_BASE_URL, year),
            Product::Prelim => {
                format!("{}/prelim/global_daily/tifs/p05/{}/", CHC_BASE_URL, year)
            }
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote file descriptor from a year listing.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub date: NaiveDate,
    pub url: String,
    pub filename: String,
}

/// Extracts the CHIRPS delivery filenames referenced by a year-directory
/// HTML listing, deduplicated and sorted.
fn parse_listing(body: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"chirps-v2\.0\.\d{4}\.\d{2}\.\d{2}\.tif\.gz").unwrap());

    let names: BTreeSet<String> = re
        .find_iter(body)
        .map(|m| m.as_str().to_string())
        .collect();
    names.into_iter().collect()
}

/// HTTP client for the CHC repository. The core depends only on [`list`]
/// and [`download`].
///
/// [`list`]: ChcClient::list
/// [`download`]: ChcClient::download
pub struct ChcClient {
    http: reqwest::Client,
}

impl Default for ChcClient {
    fn default() -> Self {
        ChcClient::new()
    }
}

impl ChcClient {
    pub fn new() -> Self {
        ChcClient {
            http: reqwest::Client::new(),
        }
    }

    /// Lists the remote files for the given years, sorted by date. A year
    /// the host does not serve yet is reported and skipped.
    pub async fn list(&self, product: Product, years: &[i32]) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();

        for &year in years {
            let url = product.listing_url(year);
            let response = self.http.get(&url).send().await?;
            if !response.status().is_success() {
                eprintln!(
                    "Warning: no remote listing for {} {} ({})",
                    product,
                    year,
                    response.status()
                );
                continue;
            }

            let body = response.text().await?;
            for filename in parse_listing(&body) {
                let date = parse_remote_filename(&filename)?;
                files.push(RemoteFile {
                    date,
                    url: format!("{}{}", url, filename),
                    filename,
                });
            }
        }

        files.sort_by_key(|f| f.date);
        Ok(files)
    }

    /// Downloads the listed files into `destination` with at most `njobs`
    /// transfers in flight, and translates them into remote-sourced
    /// catalogue records. Files already present are reused unless
    /// `overwrite` is set.
    pub async fn download(
        &self,
        files: &[RemoteFile],
        destination: &Path,
        overwrite: bool,
        njobs: usize,
        progress: &ProgressBar,
    ) -> Result<Catalogue> {
        fs::create_dir_all(destination)?;

        let tasks = files.iter().map(|file| {
            let target = destination.join(&file.filename);
            async move {
                if overwrite || !target.exists() {
                    self.fetch_file(&file.url, &target).await?;
                }
                progress.inc(1);
                Ok(CatalogueRecord::from_date(target, Source::Remote, file.date))
            }
        });

        let results: Vec<Result<CatalogueRecord>> = futures::stream::iter(tasks)
            .buffer_unordered(njobs.max(1))
            .collect()
            .await;

        let mut records = results.into_iter().collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.date);
        Ok(Catalogue::new(records))
    }

    async fn fetch_file(&self, url: &str, target: &Path) -> Result<()> {
        if let Err(e) = self.stream_to(url, target).await {
            // A failed transfer must not leave a truncated delivery behind.
            let _ = fs::remove_file(target);
            return Err(e);
        }
        Ok(())
    }

    async fn stream_to(&self, url: &str, target: &Path) -> Result<()> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Remote(format!("{} for {}", response.status(), url)));
        }

        let mut file = File::create(target)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?)?;
        }

        Ok(())
    }
}

/// The default download folder for a product,
/// `<data-dir>/chirps/chc/<product>/`.
pub fn default_download_folder(product: Product) -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chirps")
        .join("chc")
        .join(product.as_str())
}

// -- Tests -------------------------------------------------------------------
