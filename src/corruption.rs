//! Corruption filter: metadata-only classification of catalogued rasters,
//! run across a fixed-size worker pool in input order.

use std::path::Path;

use gdal::Dataset;
use rayon::prelude::*;

use crate::catalogue::{Catalogue, Corruption, FileType};
use crate::error::Result;
use crate::raster::gdal_path;

/// The identity-like transform a raster reports when it carries no real
/// georeferencing (GDAL ordering; equals the affine `(1, 0, 0, 0, 1, 0)`).
const DEGENERATE_GEO_TRANSFORM: [f64; 6] = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Classifies one raster without reading pixel data. Compressed deliveries
/// are opened through `/vsigzip/`.
pub fn classify(path: &Path, file_type: FileType) -> Corruption {
    let dataset = match Dataset::open(gdal_path(path, file_type)) {
        Ok(dataset) => dataset,
        Err(_) => return Corruption::Unopenable,
    };

    match dataset.geo_transform() {
        Ok(gt) if gt == DEGENERATE_GEO_TRANSFORM => Corruption::InvalidTransform,
        Ok(_) => Corruption::Valid,
        // GDAL reports an error when no geotransform is stored at all; that
        // is the same degenerate case.
        Err(_) => Corruption::InvalidTransform,
    }
}

/// Runs [`classify`] over every record on a pool of `njobs` workers and
/// writes the outcome back in input order.
pub fn classify_catalogue(catalogue: &mut Catalogue, njobs: usize) -> Result<()> {
    if catalogue.is_empty() {
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(njobs.max(1))
        .build()?;
    let results: Vec<Corruption> = pool.install(|| {
        catalogue
            .records()
            .par_iter()
            .map(|record| classify(&record.path, record.file_type))
            .collect()
    });

    for (record, corruption) in catalogue.records_mut().iter_mut().zip(results) {
        record.corruption = Some(corruption);
    }

    Ok(())
}

/// Splits a classified catalogue into (valid, corrupted). Only records
/// positively classified valid may reach aggregation; unchecked records
/// count as corrupted.
pub fn split_valid(catalogue: Catalogue) -> (Catalogue, Catalogue) {
    let (valid, corrupted): (Vec<_>, Vec<_>) = catalogue
        .into_records()
        .into_iter()
        .partition(|record| record.is_corrupted() == Some(false));

    (Catalogue::new(valid), Catalogue::new(corrupted))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;
    use crate::catalogue::{CatalogueRecord, Source};
    use gdal::raster::Buffer;
    use gdal::DriverManager;
    use std::path::PathBuf;

    fn write_tif(path: &Path, geo_transform: Option<[f64; 6]>) {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver
            .create_with_band_type::<f64, _>(path, 2, 2, 1)
            .unwrap();
        if let Some(gt) = geo_transform {
            dataset.set_geo_transform(&gt).unwrap();
        }
        let mut band = dataset.rasterband(1).unwrap();
        let mut buffer = Buffer::new((2, 2), vec![1.0; 4]);
        band.write((0, 0), (2, 2), &mut buffer).unwrap();
    }

    #[test]
    fn should_classify_valid_raster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chirps_ok.2020001.tif");
        write_tif(&path, Some([20.0, 0.05, 0.0, 40.0, 0.0, -0.05]));

        assert_eq!(classify(&path, FileType::Raster), Corruption::Valid);
    }

    #[test]
    fn should_classify_unopenable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chirps_bad.2020001.tif");
        std::fs::write(&path, b"plain text, not a raster").unwrap();

        assert_eq!(classify(&path, FileType::Raster), Corruption::Unopenable);
    }

    #[test]
    fn should_classify_degenerate_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chirps_identity.2020001.tif");
        write_tif(&path, Some(DEGENERATE_GEO_TRANSFORM));

        assert_eq!(
            classify(&path, FileType::Raster),
            Corruption::InvalidTransform
        );
    }

    #[test]
    fn should_classify_missing_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chirps_nogt.2020001.tif");
        write_tif(&path, None);

        assert_eq!(
            classify(&path, FileType::Raster),
            Corruption::InvalidTransform
        );
    }

    #[test]
    fn should_classify_catalogue_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("chirps_a.2020001.tif");
        let bad = dir.path().join("chirps_b.2020002.tif");
        write_tif(&good, Some([20.0, 0.05, 0.0, 40.0, 0.0, -0.05]));
        std::fs::write(&bad, b"garbage").unwrap();

        let records = vec![
            CatalogueRecord::new(good, Source::Archive, 2020, 1).unwrap(),
            CatalogueRecord::new(bad, Source::Archive, 2020, 2).unwrap(),
        ];

        let mut first = Catalogue::new(records.clone());
        classify_catalogue(&mut first, 2).unwrap();
        let mut second = Catalogue::new(records);
        classify_catalogue(&mut second, 2).unwrap();

        let outcomes = |c: &Catalogue| {
            c.records()
                .iter()
                .map(|r| r.corruption)
                .collect::<Vec<_>>()
        };
        assert_eq!(outcomes(&first), outcomes(&second));
        assert_eq!(
            outcomes(&first),
            vec![Some(Corruption::Valid), Some(Corruption::Unopenable)]
        );
    }

    #[test]
    fn should_split_valid_from_corrupted() {
        let mut records = vec![
            CatalogueRecord::new(PathBuf::from("a_x.2020001.tif"), Source::Archive, 2020, 1)
                .unwrap(),
            CatalogueRecord::new(PathBuf::from("a_x.2020002.tif"), Source::Archive, 2020, 2)
                .unwrap(),
        ];
        records[0].corruption = Some(Corruption::Valid);
        records[1].corruption = Some(Corruption::InvalidTransform);

        let (valid, corrupted) = split_valid(Catalogue::new(records));

        assert_eq!(valid.len(), 1);
        assert_eq!(valid.records()[0].day_of_year, 1);
        assert_eq!(corrupted.len(), 1);
        assert_eq!(
            corrupted.records()[0].corruption,
            Some(Corruption::InvalidTransform)
        );
    }
}
