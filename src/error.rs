//! Error taxonomy for the catalogue and aggregation pipeline.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A filename with an allow-listed extension did not match its source's
    /// pattern. Fatal for the scan that hit it.
    #[error("could not parse filename `{filename}`: {reason}")]
    Parse { filename: String, reason: String },

    /// A precondition violation: bad option combination or a load strategy
    /// invoked without its required auxiliary inputs.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The requested range still has missing dates after reconciliation.
    #[error("{} dates missing in the requested range ({} to {})",
        missing.len(),
        missing.first().map(|d| d.to_string()).unwrap_or_default(),
        missing.last().map(|d| d.to_string()).unwrap_or_default())]
    Coverage { missing: Vec<NaiveDate> },

    /// No dates at all are available in the requested range. Fatal under
    /// every missing-dates policy.
    #[error("no dates available in the requested range")]
    NoAvailableDates,

    #[error("crop failed: {0}")]
    Crop(String),

    #[error("remote request failed: {0}")]
    Remote(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
