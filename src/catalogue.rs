//! The date-indexed catalogue of raster files and its reconciliation rules.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::dates::{date_from_year_day, year_day_from_date};
use crate::error::{Error, Result};
use crate::raster::LoadMethod;

/// Archive rasters are stored pre-scaled by 100 and must be divided back.
const ARCHIVE_MULTIPLIER: f64 = 1.0 / 100.0;
const REMOTE_MULTIPLIER: f64 = 1.0;

/// Provenance of a catalogued raster. `Archive` wins date ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The long-lived agricultural-monitoring archive (plain `.tif`).
    Archive,
    /// The CHC climate-data host (gzip-compressed `.tif.gz` deliveries).
    Remote,
}

impl Source {
    pub fn extension(self) -> &'static str {
        match self {
            Source::Archive => ".tif",
            Source::Remote => ".tif.gz",
        }
    }

    pub fn file_type(self) -> FileType {
        match self {
            Source::Archive => FileType::Raster,
            Source::Remote => FileType::RasterCompressed,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Source::Archive => ARCHIVE_MULTIPLIER,
            Source::Remote => REMOTE_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Raster,
    RasterCompressed,
}

/// Outcome of the corruption check for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    Valid,
    /// The file could not be opened as a raster.
    Unopenable,
    /// The file opened but carries the degenerate identity geotransform.
    InvalidTransform,
}

/// One raster's metadata. Created by the folder scan or by translating a
/// remote download; the multiplier is fixed by source at construction and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CatalogueRecord {
    pub path: PathBuf,
    pub file_type: FileType,
    pub date: NaiveDate,
    pub year: i32,
    pub day_of_year: u32,
    pub source: Source,
    pub multiplier: f64,
    /// `None` until the corruption filter has run.
    pub corruption: Option<Corruption>,
    pub load_method: LoadMethod,
}

impl CatalogueRecord {
    pub fn new(path: PathBuf, source: Source, year: i32, day_of_year: u32) -> Result<Self> {
        let date = date_from_year_day(year, day_of_year)?;
        Ok(CatalogueRecord {
            path,
            file_type: source.file_type(),
            date,
            year,
            day_of_year,
            source,
            multiplier: source.multiplier(),
            corruption: None,
            load_method: LoadMethod::ReadOnly,
        })
    }

    pub fn from_date(path: PathBuf, source: Source, date: NaiveDate) -> Self {
        let (year, day_of_year) = year_day_from_date(date);
        CatalogueRecord {
            path,
            file_type: source.file_type(),
            date,
            year,
            day_of_year,
            source,
            multiplier: source.multiplier(),
            corruption: None,
            load_method: LoadMethod::ReadOnly,
        }
    }

    pub fn is_corrupted(&self) -> Option<bool> {
        self.corruption.map(|c| c != Corruption::Valid)
    }
}

/// Parses an archive filename, `<prefix>_<...>.<YYYYDDD>.tif`: year is the
/// first four digits of the final stem token, day-of-year the remaining
/// three.
pub fn parse_archive_filename(filename: &str) -> Result<(i32, u32)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^.+_.*\.(\d{4})(\d{3})\.tif$").unwrap());

    let caps = re.captures(filename).ok_or_else(|| Error::Parse {
        filename: filename.to_string(),
        reason: "expected `<prefix>_<...>.<YYYYDDD>.tif`".to_string(),
    })?;

    Ok((caps[1].parse().unwrap(), caps[2].parse().unwrap()))
}

/// Parses a CHC filename, `chirps-v2.0.<YYYY>.<MM>.<DD>.tif.gz`, to a
/// calendar date.
pub fn parse_remote_filename(filename: &str) -> Result<NaiveDate> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"^chirps-v2\.0\.(\d{4})\.(\d{2})\.(\d{2})\.tif\.gz$").unwrap());

    let caps = re.captures(filename).ok_or_else(|| Error::Parse {
        filename: filename.to_string(),
        reason: "expected `chirps-v2.0.<YYYY>.<MM>.<DD>.tif.gz`".to_string(),
    })?;

    let (year, month, day) = (
        caps[1].parse().unwrap(),
        caps[2].parse().unwrap(),
        caps[3].parse().unwrap(),
    );
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| Error::Parse {
        filename: filename.to_string(),
        reason: format!("{}-{:02}-{:02} is not a calendar date", year, month, day),
    })
}

/// An ordered collection of [`CatalogueRecord`]. Date-ascending after
/// merge; scan order before.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    records: Vec<CatalogueRecord>,
}

impl Catalogue {
    pub fn new(records: Vec<CatalogueRecord>) -> Self {
        Catalogue { records }
    }

    pub fn empty() -> Self {
        Catalogue::default()
    }

    /// Scans `folder` non-recursively for files carrying the source's
    /// allow-listed extension and parses each filename into a record.
    /// An empty folder yields an empty catalogue, not an error; a filename
    /// that does not match the source's pattern is a fatal parse error.
    pub fn scan(folder: &Path, source: Source) -> Result<Self> {
        if !folder.exists() {
            return Ok(Catalogue::empty());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(folder)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(source.extension()))
            })
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let record = match source {
                Source::Archive => {
                    let (year, day) = parse_archive_filename(&filename)?;
                    CatalogueRecord::new(path, source, year, day).map_err(|_| Error::Parse {
                        filename: filename.clone(),
                        reason: "day-of-year out of range".to_string(),
                    })?
                }
                Source::Remote => {
                    let date = parse_remote_filename(&filename)?;
                    CatalogueRecord::from_date(path, source, date)
                }
            };
            records.push(record);
        }

        Ok(Catalogue { records })
    }

    pub fn records(&self) -> &[CatalogueRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [CatalogueRecord] {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<CatalogueRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    /// Keeps only records whose year is in `years`.
    pub fn retain_years(&mut self, years: &[i32]) {
        self.records.retain(|r| years.contains(&r.year));
    }

    /// Drops records dated strictly after `bound`. The remote query may
    /// return dates slightly outside the requested window.
    pub fn clamp_before(&mut self, bound: NaiveDate) {
        self.records.retain(|r| r.date <= bound);
    }

    /// Drops records whose date is claimed by a higher-precedence source.
    /// A corrupted primary record still claims its nominal date: an
    /// already-catalogued file is never superseded for the same date.
    pub fn retain_dates_not_in(&mut self, claimed: &BTreeSet<NaiveDate>) {
        self.records.retain(|r| !claimed.contains(&r.date));
    }

    pub fn sort_by_date(&mut self) {
        self.records.sort_by_key(|r| r.date);
    }

    /// Merges two catalogues, date-ascending. Every `primary` record is
    /// kept; a `secondary` record survives only if its date is absent from
    /// `primary`, so at most one record per date remains.
    pub fn merge_preferring(primary: Catalogue, secondary: Catalogue) -> Catalogue {
        let held: BTreeSet<NaiveDate> = primary.records.iter().map(|r| r.date).collect();

        let mut records = primary.records;
        records.extend(
            secondary
                .records
                .into_iter()
                .filter(|r| !held.contains(&r.date)),
        );

        let mut merged = Catalogue { records };
        merged.sort_by_date();
        merged
    }

    /// Assigns each record's load strategy: compressed deliveries are
    /// coregistered onto the reference grid when one is available, anything
    /// already on the reference grid is read and cropped directly.
    pub fn assign_load_methods(&mut self, reference_available: bool) {
        for record in &mut self.records {
            record.load_method =
                if record.file_type == FileType::RasterCompressed && reference_available {
                    LoadMethod::CoregisterAndCrop
                } else {
                    LoadMethod::ReadAndCrop
                };
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn archive_record(day: u32) -> CatalogueRecord {
        CatalogueRecord::new(
            PathBuf::from(format!("/data/chirps_global.2020{:03}.tif", day)),
            Source::Archive,
            2020,
            day,
        )
        .unwrap()
    }

    fn remote_record(day: u32) -> CatalogueRecord {
        CatalogueRecord::new(
            PathBuf::from(format!("/downloads/chirps.2020{:03}.tif.gz", day)),
            Source::Remote,
            2020,
            day,
        )
        .unwrap()
    }

    #[test]
    fn should_parse_archive_filename() {
        let (year, day) = parse_archive_filename("chirps_global.2020001.tif").unwrap();
        assert_eq!((year, day), (2020, 1));

        let (year, day) = parse_archive_filename("chirps_v2_ws.1981365.tif").unwrap();
        assert_eq!((year, day), (1981, 365));
    }

    #[test]
    fn should_reject_malformed_archive_filename() {
        for name in ["chirps.2020001.tif", "chirps_global.202001.tif", "notes.txt"] {
            assert!(parse_archive_filename(name).is_err(), "accepted {}", name);
        }
    }

    #[test]
    fn should_parse_remote_filename() {
        let parsed = parse_remote_filename("chirps-v2.0.2020.02.29.tif.gz").unwrap();
        assert_eq!(parsed, date(2020, 2, 29));
    }

    #[test]
    fn should_reject_malformed_remote_filename() {
        for name in [
            "chirps-v2.0.2020.02.tif.gz",
            "chirps-v1.0.2020.02.29.tif.gz",
            "chirps-v2.0.2021.02.29.tif.gz",
        ] {
            assert!(parse_remote_filename(name).is_err(), "accepted {}", name);
        }
    }

    #[test]
    fn should_fix_multiplier_by_source() {
        assert_eq!(archive_record(1).multiplier, 1.0 / 100.0);
        assert_eq!(remote_record(1).multiplier, 1.0);
    }

    #[test]
    fn should_scan_folder_into_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "chirps_global.2020002.tif",
            "chirps_global.2020001.tif",
            "readme.md",
        ] {
            std::fs::File::create(dir.path().join(name)).unwrap();
        }

        let catalogue = Catalogue::scan(dir.path(), Source::Archive).unwrap();

        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue.records()[0].date, date(2020, 1, 1));
        assert_eq!(catalogue.records()[1].date, date(2020, 1, 2));
    }

    #[test]
    fn should_scan_missing_folder_as_empty() {
        let catalogue = Catalogue::scan(Path::new("/no/such/folder"), Source::Remote).unwrap();
        assert!(catalogue.is_empty());
    }

    #[test]
    fn should_fail_scan_on_unparseable_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("mystery.tif")).unwrap();

        assert!(matches!(
            Catalogue::scan(dir.path(), Source::Archive),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn should_filter_by_year() {
        let mut catalogue = Catalogue::new(vec![
            CatalogueRecord::new(PathBuf::from("a_x.2019001.tif"), Source::Archive, 2019, 1)
                .unwrap(),
            archive_record(1),
        ]);
        catalogue.retain_years(&[2020]);

        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.records()[0].year, 2020);
    }

    #[test]
    fn should_prefer_archive_over_remote_for_same_date() {
        let merged = Catalogue::merge_preferring(
            Catalogue::new(vec![archive_record(3)]),
            Catalogue::new(vec![remote_record(3)]),
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.records()[0].source, Source::Archive);
    }

    #[test]
    fn should_merge_sorted_with_unique_dates() {
        let local = Catalogue::new(vec![archive_record(5), archive_record(1)]);
        let downloads = Catalogue::new(vec![remote_record(1), remote_record(2)]);

        let merged = Catalogue::merge_preferring(local, downloads);

        let dates: Vec<NaiveDate> = merged.dates();
        assert_eq!(dates, vec![date(2020, 1, 1), date(2020, 1, 2), date(2020, 1, 5)]);
        assert_eq!(merged.records()[0].source, Source::Archive);
        assert_eq!(merged.records()[1].source, Source::Remote);
    }

    #[test]
    fn should_clamp_dates_after_bound() {
        let mut catalogue = Catalogue::new(vec![remote_record(1), remote_record(9)]);
        catalogue.clamp_before(date(2020, 1, 5));

        assert_eq!(catalogue.dates(), vec![date(2020, 1, 1)]);
    }

    #[test]
    fn should_assign_load_methods_by_file_type() {
        let mut catalogue = Catalogue::new(vec![archive_record(1), remote_record(2)]);

        catalogue.assign_load_methods(true);
        assert_eq!(catalogue.records()[0].load_method, LoadMethod::ReadAndCrop);
        assert_eq!(
            catalogue.records()[1].load_method,
            LoadMethod::CoregisterAndCrop
        );

        catalogue.assign_load_methods(false);
        assert_eq!(catalogue.records()[1].load_method, LoadMethod::ReadAndCrop);
    }

    // The reconciliation scenario: archive holds days 1-5 (day 3 corrupted,
    // invalid transform), the download folder holds days 1-4; the window is
    // Jan 1-10 of 2020.
    #[test]
    fn should_reconcile_overlapping_sources() {
        use crate::dates::{missing_dates, missing_years};

        let archive = Catalogue::new((1..=5).map(archive_record).collect());
        let remote_local = Catalogue::new((1..=4).map(remote_record).collect());

        let claimed: BTreeSet<NaiveDate> = archive.dates().into_iter().collect();

        let archive_valid = Catalogue::new(
            archive
                .into_records()
                .into_iter()
                .filter(|r| r.day_of_year != 3)
                .collect(),
        );
        let remote_valid = remote_local;

        // Missing dates come from the union of valid dates across sources;
        // the remote day 3 covers the corrupt archive day 3.
        let mut valid_dates = archive_valid.dates();
        valid_dates.extend(remote_valid.dates());
        let missing = missing_dates(&valid_dates, &[2020], date(2020, 1, 1), date(2020, 1, 10));
        assert_eq!(missing, (6..=10).map(|d| date(2020, 1, d)).collect::<Vec<_>>());
        assert_eq!(missing_years(&missing), vec![2020]);

        // The archive claims days 1-5 outright, so every remote-local record
        // is discarded and day 3 is absent from the merged catalogue.
        let mut remote_fresh = remote_valid;
        remote_fresh.retain_dates_not_in(&claimed);
        assert!(remote_fresh.is_empty());

        let local = Catalogue::merge_preferring(archive_valid, remote_fresh);
        assert_eq!(
            local.dates(),
            [1, 2, 4, 5].map(|d| date(2020, 1, d)).to_vec()
        );
        assert!(local.records().iter().all(|r| r.source == Source::Archive));

        // Fetch fills days 6-10; the final catalogue has nine unique dates.
        let downloads = Catalogue::new((6..=10).map(remote_record).collect());
        let merged = Catalogue::merge_preferring(local, downloads);

        let dates = merged.dates();
        assert_eq!(dates.len(), 9);
        let unique: BTreeSet<NaiveDate> = dates.iter().copied().collect();
        assert_eq!(unique.len(), 9);
        assert!(!dates.contains(&date(2020, 1, 3)));
    }
}
