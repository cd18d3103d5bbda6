//! Coregistration: resampling a raster onto a reference grid so it can be
//! cropped pixel-for-pixel against archive-grid geometries.

use std::path::Path;

use clap::ValueEnum;
use gdal::Dataset;
use ndarray::Array2;

use crate::error::Result;
use crate::raster::Raster;

/// Resampling kernel for the grid transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
}

impl std::fmt::Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Resampling::Nearest => "nearest",
            Resampling::Bilinear => "bilinear",
        })
    }
}

/// The grid a source raster is resampled onto: geotransform, shape and
/// spatial reference of the reference archive raster. Reading it touches
/// metadata only.
#[derive(Debug, Clone)]
pub struct ReferenceGrid {
    pub geo_transform: [f64; 6],
    pub width: usize,
    pub height: usize,
    pub projection: String,
}

impl ReferenceGrid {
    pub fn read(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        Ok(ReferenceGrid {
            geo_transform,
            width,
            height,
            projection: dataset.projection(),
        })
    }
}

/// Builds a zero grid with the reference's geotransform and shape, then
/// fills it by sampling the source through the chosen kernel. Cells outside
/// the source's coverage take `nodata` when given, otherwise stay at the
/// zero grid's value. The result lives entirely in memory and is dropped
/// with its owner.
pub fn coregister(
    source: &Raster,
    reference: &ReferenceGrid,
    resampling: Resampling,
    nodata: Option<f64>,
) -> Raster {
    let fill = nodata.unwrap_or(0.0);
    let rgt = reference.geo_transform;
    let mut data = Array2::zeros((reference.height, reference.width));

    for ((row, col), cell) in data.indexed_iter_mut() {
        let x = rgt[0] + (col as f64 + 0.5) * rgt[1];
        let y = rgt[3] + (row as f64 + 0.5) * rgt[5];
        *cell = sample(source, x, y, resampling).unwrap_or(fill);
    }

    Raster {
        data,
        geo_transform: rgt,
        projection: reference.projection.clone(),
    }
}

/// Samples the source raster at the geographic point `(x, y)`, or `None`
/// when the point falls outside the source's coverage.
fn sample(source: &Raster, x: f64, y: f64, resampling: Resampling) -> Option<f64> {
    let gt = source.geo_transform;
    let (rows, cols) = source.data.dim();

    // Fractional pixel position of the point, in pixel-centre coordinates.
    let col = (x - gt[0]) / gt[1] - 0.5;
    let row = (y - gt[3]) / gt[5] - 0.5;

    match resampling {
        Resampling::Nearest => {
            let (r, c) = (row.round(), col.round());
            if r < 0.0 || c < 0.0 || r as usize >= rows || c as usize >= cols {
                return None;
            }
            Some(source.data[[r as usize, c as usize]])
        }
        Resampling::Bilinear => {
            let (r0, c0) = (row.floor(), col.floor());
            if r0 < 0.0 || c0 < 0.0 {
                return None;
            }
            let (r0, c0) = (r0 as usize, c0 as usize);
            if r0 + 1 >= rows || c0 + 1 >= cols {
                return None;
            }
            let (dr, dc) = (row - r0 as f64, col - c0 as f64);
            let top = source.data[[r0, c0]] * (1.0 - dc) + source.data[[r0, c0 + 1]] * dc;
            let bottom =
                source.data[[r0 + 1, c0]] * (1.0 - dc) + source.data[[r0 + 1, c0 + 1]] * dc;
            Some(top * (1.0 - dr) + bottom * dr)
        }
    }
}

// -- Tests -------------------------------------------------------------------
