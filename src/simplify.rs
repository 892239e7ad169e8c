//! Geometry simplification collaborator.

use geo::Simplify;
use geo_types::Geometry;
use geojson::{Feature, FeatureCollection};

use crate::error::{Error, Result};

/// Reduces the vertex count of a feature collection.
pub trait Simplifier {
    fn simplify(&self, collection: &FeatureCollection, tolerance: f64) -> Result<FeatureCollection>;
}

/// Ramer-Douglas-Peucker on lines and polygons; points pass through unchanged.
///
/// The tolerance is in the collection's coordinate units (degrees for tile
/// GeoJSON).
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoSimplifier;

impl Simplifier for GeoSimplifier {
    fn simplify(&self, collection: &FeatureCollection, tolerance: f64) -> Result<FeatureCollection> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::Simplification(format!(
                "tolerance must be a non-negative number, got {tolerance}"
            )));
        }
        let features = collection
            .features
            .iter()
            .map(|feature| simplify_feature(feature, tolerance))
            .collect::<Result<Vec<_>>>()?;
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: collection.foreign_members.clone(),
        })
    }
}

fn simplify_feature(feature: &Feature, tolerance: f64) -> Result<Feature> {
    let Some(geometry) = feature.geometry.as_ref() else {
        return Ok(feature.clone());
    };
    let geom: Geometry<f64> = geometry
        .value
        .clone()
        .try_into()
        .map_err(|err: geojson::Error| Error::Simplification(err.to_string()))?;
    let simplified = simplify_geometry(geom, tolerance);
    let mut out = feature.clone();
    out.bbox = None;
    out.geometry = Some(geojson::Geometry::new(geojson::Value::from(&simplified)));
    Ok(out)
}

fn simplify_geometry(geom: Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    match geom {
        Geometry::LineString(line) => Geometry::LineString(line.simplify(&tolerance)),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(lines.simplify(&tolerance)),
        Geometry::Polygon(polygon) => Geometry::Polygon(polygon.simplify(&tolerance)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(polygons.simplify(&tolerance)),
        Geometry::GeometryCollection(collection) => Geometry::GeometryCollection(
            collection
                .into_iter()
                .map(|geom| simplify_geometry(geom, tolerance))
                .collect(),
        ),
        other => other,
    }
}
