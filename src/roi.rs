//! Region-of-interest geometries: loaded from any GDAL-readable vector
//! file, reprojected to the raster's spatial reference before use.

use std::path::Path;

use gdal::spatial_ref::{AxisMappingStrategy, SpatialRef};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use geo::{BoundingRect, Contains, Geometry, Point, Polygon, Rect};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Roi {
    polygons: Vec<Polygon<f64>>,
}

impl Roi {
    pub fn new(polygons: Vec<Polygon<f64>>) -> Self {
        Roi { polygons }
    }

    /// Reads every polygon from the first layer of a vector file. When a
    /// target spatial reference (WKT) is given, geometries are reprojected
    /// into it before conversion.
    pub fn from_vector_file(path: &Path, target_wkt: Option<&str>) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let mut layer = dataset.layer(0)?;

        let target = match target_wkt {
            Some(wkt) if !wkt.is_empty() => {
                let mut srs = SpatialRef::from_wkt(wkt)?;
                srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
                Some(srs)
            }
            _ => None,
        };

        let mut polygons = Vec::new();
        for feature in layer.features() {
            let Some(geometry) = feature.geometry() else {
                continue;
            };
            let geometry = match &target {
                Some(srs) => geometry.transform_to(srs)?.to_geo()?,
                None => geometry.to_geo()?,
            };
            collect_polygons(geometry, &mut polygons);
        }

        if polygons.is_empty() {
            return Err(Error::Configuration(format!(
                "no polygon geometries found in `{}`",
                path.display()
            )));
        }

        Ok(Roi { polygons })
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.polygons
    }

    /// Replaces every polygon with its bounding envelope. Applied before a
    /// centre-pixel aggregation so the flattened midpoint is meaningful.
    pub fn envelope(&self) -> Roi {
        let polygons = self
            .polygons
            .iter()
            .filter_map(|p| p.bounding_rect())
            .map(|rect| rect.to_polygon())
            .collect();
        Roi { polygons }
    }

    /// The union bounding box over all polygons.
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        let mut rects = self.polygons.iter().filter_map(|p| p.bounding_rect());
        let first = rects.next()?;
        Some(rects.fold(first, |acc, r| {
            Rect::new(
                (acc.min().x.min(r.min().x), acc.min().y.min(r.min().y)),
                (acc.max().x.max(r.max().x), acc.max().y.max(r.max().y)),
            )
        }))
    }

    /// Whether any polygon contains the point `(x, y)`.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let point = Point::new(x, y);
        self.polygons.iter().any(|p| p.contains(&point))
    }
}

fn collect_polygons(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => out.push(polygon),
        Geometry::MultiPolygon(multi) => out.extend(multi.0),
        Geometry::GeometryCollection(collection) => {
            for inner in collection.0 {
                collect_polygons(inner, out);
            }
        }
        _ => {}
    }
}

// -- Tests -------------------------------------------------------------------
