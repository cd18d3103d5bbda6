//! Raster loading: GDAL-backed reads, transparent gzip decompression and
//! cropping to region-of-interest geometries.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::GzDecoder;
use gdal::Dataset;
use ndarray::Array2;

use crate::catalogue::FileType;
use crate::coregister::{self, Resampling};
use crate::error::{Error, Result};
use crate::roi::Roi;

/// Sentinel no-data value used across the CHIRPS raster family.
pub const CHIRPS_NODATA: f64 = -9999.0;

/// How a catalogued raster is turned into a pixel array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMethod {
    /// Read the whole grid, no region of interest.
    ReadOnly,
    /// Read, then crop to the ROI geometries. The raster is already on the
    /// reference grid.
    ReadAndCrop,
    /// Resample onto the reference grid, then crop. Needed when the native
    /// grid differs from the reference archive grid.
    CoregisterAndCrop,
}

/// A decoded raster: band-one pixels plus geotransform metadata.
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: Array2<f64>,
    pub geo_transform: [f64; 6],
    pub projection: String,
}

impl Raster {
    /// Reads band one of a GDAL-readable raster in full.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let geo_transform = dataset.geo_transform()?;
        let projection = dataset.projection();
        let (width, height) = dataset.raster_size();

        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
        let data = Array2::from_shape_vec((height, width), buffer.data().to_vec())?;

        Ok(Raster {
            data,
            geo_transform,
            projection,
        })
    }

    /// Reads only the projection string, for reprojecting ROI geometries.
    pub fn read_projection(path: &Path) -> Result<String> {
        Ok(Dataset::open(path)?.projection())
    }
}

/// The GDAL path for a catalogued file: compressed deliveries are opened
/// through the `/vsigzip/` virtual filesystem.
pub fn gdal_path(path: &Path, file_type: FileType) -> PathBuf {
    match file_type {
        FileType::Raster => path.to_path_buf(),
        FileType::RasterCompressed => PathBuf::from(format!("/vsigzip/{}", path.display())),
    }
}

static TRANSIENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A per-invocation unique filename, so concurrent workers never collide in
/// the shared working folder.
fn unique_name(filename: &str) -> String {
    let seq = TRANSIENT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{:06}+{}", seq, filename)
}

/// A gzip delivery decompressed to a transient plain raster. The file is
/// removed when the guard goes out of scope, on every exit path.
pub struct TransientTif {
    path: PathBuf,
}

impl TransientTif {
    pub fn decompress(source: &Path, working_dir: &Path) -> Result<Self> {
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download.tif.gz");
        let filename = filename.strip_suffix(".gz").unwrap_or(filename);
        let path = working_dir.join(unique_name(filename));

        let mut decoder = GzDecoder::new(File::open(source)?);
        let mut out = File::create(&path)?;
        io::copy(&mut decoder, &mut out)?;

        Ok(TransientTif { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientTif {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Auxiliary inputs for [`load`]. The working directory is a scoped
/// resource owned by the caller.
pub struct LoadContext<'a> {
    pub roi: Option<&'a Roi>,
    pub reference: Option<&'a Path>,
    pub working_dir: &'a Path,
    pub resampling: Resampling,
}

/// Loads one catalogued raster with the given strategy. Precondition
/// violations surface before any file is touched.
pub fn load(
    path: &Path,
    file_type: FileType,
    method: LoadMethod,
    ctx: &LoadContext,
) -> Result<Array2<f64>> {
    let roi = match method {
        LoadMethod::ReadOnly => None,
        LoadMethod::ReadAndCrop | LoadMethod::CoregisterAndCrop => {
            Some(ctx.roi.ok_or_else(|| {
                Error::Configuration(format!("load method {:?} requires ROI geometries", method))
            })?)
        }
    };
    let reference = match method {
        LoadMethod::CoregisterAndCrop => Some(ctx.reference.ok_or_else(|| {
            Error::Configuration(format!(
                "load method {:?} requires a reference raster",
                method
            ))
        })?),
        _ => None,
    };

    let transient;
    let tif_path = match file_type {
        FileType::Raster => path,
        FileType::RasterCompressed => {
            transient = TransientTif::decompress(path, ctx.working_dir)?;
            transient.path()
        }
    };

    match method {
        LoadMethod::ReadOnly => Ok(Raster::open(tif_path)?.data),
        LoadMethod::ReadAndCrop => {
            let raster = Raster::open(tif_path)?;
            crop(&raster, roi.unwrap())
        }
        LoadMethod::CoregisterAndCrop => {
            let source = Raster::open(tif_path)?;
            let reference = coregister::ReferenceGrid::read(reference.unwrap())?;
            let coregistered = coregister::coregister(&source, &reference, ctx.resampling, None);
            crop(&coregistered, roi.unwrap())
        }
    }
}

/// Crops a raster to the ROI's bounding window and masks pixels whose
/// centre falls outside every polygon with the no-data sentinel.
pub fn crop(raster: &Raster, roi: &Roi) -> Result<Array2<f64>> {
    let bbox = roi
        .bounding_box()
        .ok_or_else(|| Error::Crop("ROI has no geometries".to_string()))?;

    let gt = raster.geo_transform;
    let (rows, cols) = raster.data.dim();

    // Pixel window covering the bounding box; gt[5] is negative for
    // north-up rasters, so the y axis inverts.
    let col_start = ((bbox.min().x - gt[0]) / gt[1]).floor().max(0.0) as usize;
    let col_end = (((bbox.max().x - gt[0]) / gt[1]).ceil() as usize).min(cols);
    let row_start = ((bbox.max().y - gt[3]) / gt[5]).floor().max(0.0) as usize;
    let row_end = (((bbox.min().y - gt[3]) / gt[5]).ceil() as usize).min(rows);

    if col_start >= col_end || row_start >= row_end {
        return Err(Error::Crop(
            "ROI does not overlap the raster extent".to_string(),
        ));
    }

    let mut window = raster
        .data
        .slice(ndarray::s![row_start..row_end, col_start..col_end])
        .to_owned();

    for ((row, col), value) in window.indexed_iter_mut() {
        let x = gt[0] + (col_start + col) as f64 * gt[1] + gt[1] / 2.0;
        let y = gt[3] + (row_start + row) as f64 * gt[5] + gt[5] / 2.0;
        if !roi.contains(x, y) {
            *value = CHIRPS_NODATA;
        }
    }

    Ok(window)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;
    use geo::polygon;
    use ndarray::array;

    // 4x4 grid, one-degree pixels, origin at the north-west corner (0, 4).
    fn test_raster() -> Raster {
        Raster {
            data: Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64),
            geo_transform: [0.0, 1.0, 0.0, 4.0, 0.0, -1.0],
            projection: String::new(),
        }
    }

    #[test]
    fn should_crop_to_roi_window() {
        let raster = test_raster();
        // Covers the pixel centres of columns 1-2, rows 1-2.
        let roi = Roi::new(vec![polygon![
            (x: 1.0, y: 1.0),
            (x: 3.0, y: 1.0),
            (x: 3.0, y: 3.0),
            (x: 1.0, y: 3.0),
        ]]);

        let cropped = crop(&raster, &roi).unwrap();

        assert_eq!(cropped, array![[5.0, 6.0], [9.0, 10.0]]);
    }

    #[test]
    fn should_mask_pixels_outside_polygon() {
        let raster = test_raster();
        // Triangle covering only the north-west half of the 2x2 window.
        let roi = Roi::new(vec![polygon![
            (x: 1.0, y: 3.0),
            (x: 3.0, y: 3.0),
            (x: 1.0, y: 1.0),
        ]]);

        let cropped = crop(&raster, &roi).unwrap();

        assert_eq!(cropped[[0, 0]], 5.0);
        assert_eq!(cropped[[1, 1]], CHIRPS_NODATA);
    }

    #[test]
    fn should_fail_crop_outside_extent() {
        let raster = test_raster();
        let roi = Roi::new(vec![polygon![
            (x: 100.0, y: 100.0),
            (x: 101.0, y: 100.0),
            (x: 101.0, y: 101.0),
        ]]);

        assert!(matches!(crop(&raster, &roi), Err(Error::Crop(_))));
    }

    #[test]
    fn should_require_roi_before_touching_file() {
        let ctx = LoadContext {
            roi: None,
            reference: None,
            working_dir: Path::new("/tmp"),
            resampling: Resampling::Nearest,
        };

        // The path does not exist; a precondition error proves the check
        // runs before any I/O.
        let result = load(
            Path::new("/no/such/file.tif"),
            FileType::Raster,
            LoadMethod::ReadAndCrop,
            &ctx,
        );

        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn should_require_reference_for_coregistration() {
        let roi = Roi::new(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]]);
        let ctx = LoadContext {
            roi: Some(&roi),
            reference: None,
            working_dir: Path::new("/tmp"),
            resampling: Resampling::Nearest,
        };

        let result = load(
            Path::new("/no/such/file.tif.gz"),
            FileType::RasterCompressed,
            LoadMethod::CoregisterAndCrop,
            &ctx,
        );

        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn should_delete_transient_tif_on_drop() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let gz_path = dir.path().join("chirps-v2.0.2020.01.01.tif.gz");
        let mut encoder = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        encoder.write_all(b"not really a tif").unwrap();
        encoder.finish().unwrap();

        let transient_path;
        {
            let transient = TransientTif::decompress(&gz_path, dir.path()).unwrap();
            transient_path = transient.path().to_path_buf();
            assert_eq!(
                fs::read(&transient_path).unwrap(),
                b"not really a tif".to_vec()
            );
        }

        assert!(!transient_path.exists());
    }

    #[test]
    fn should_give_unique_transient_names() {
        let a = unique_name("chirps.tif");
        let b = unique_name("chirps.tif");

        assert_ne!(a, b);
        assert!(a.ends_with("+chirps.tif"));
    }

    #[test]
    fn should_wrap_compressed_paths_for_gdal() {
        let plain = gdal_path(Path::new("/data/a.tif"), FileType::Raster);
        assert_eq!(plain, PathBuf::from("/data/a.tif"));

        let compressed = gdal_path(Path::new("/data/a.tif.gz"), FileType::RasterCompressed);
        assert_eq!(compressed, PathBuf::from("/vsigzip//data/a.tif.gz"));
    }
}
