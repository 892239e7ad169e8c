//! GeoJSON views of a structured tile, one FeatureCollection per layer.

use std::collections::BTreeMap;

use geojson::{Feature as GeoFeature, FeatureCollection, Geometry, JsonObject, Value};

use crate::coords::{geo_to_normalized, local_to_normalized, normalized_to_geo, normalized_to_local};
use crate::error::{Error, Result};
use crate::mbtiles::TileCoord;
use crate::tile::types::{
    Feature, GeomType, Layer, LayerDictionary, StructuredTile, TileValue, close_ring,
};

pub type LayerCollections = BTreeMap<String, FeatureCollection>;

pub fn to_geojson(tile: &StructuredTile, coord: TileCoord) -> LayerCollections {
    tile.layers
        .iter()
        .map(|layer| (layer.name.clone(), layer_to_geojson(layer, coord)))
        .collect()
}

pub fn layer_to_geojson(layer: &Layer, coord: TileCoord) -> FeatureCollection {
    let project = |ring: &[i32]| -> Vec<Vec<f64>> {
        ring.chunks_exact(2)
            .map(|pair| {
                let (x, y) = local_to_normalized(
                    coord.zoom,
                    coord.x,
                    coord.y,
                    layer.extent,
                    pair[0] as f64,
                    pair[1] as f64,
                );
                let (lon, lat) = normalized_to_geo(x, y);
                vec![lon, lat]
            })
            .collect()
    };

    let features = layer
        .features
        .iter()
        .filter_map(|feature| {
            let value = geometry_value(feature, &project)?;
            let mut properties = JsonObject::new();
            for (key, val) in layer.properties(feature) {
                properties.insert(key.to_string(), val.to_json());
            }
            Some(GeoFeature {
                bbox: None,
                geometry: Some(Geometry::new(value)),
                id: feature
                    .id
                    .map(|id| geojson::feature::Id::Number(serde_json::Number::from(id))),
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn geometry_value(feature: &Feature, project: &dyn Fn(&[i32]) -> Vec<Vec<f64>>) -> Option<Value> {
    let rings = feature
        .geometry
        .iter()
        .filter(|ring| ring.len() >= 2)
        .collect::<Vec<_>>();
    match feature.geom_type {
        GeomType::Point => {
            let mut points = rings
                .iter()
                .flat_map(|ring| project(ring.as_slice()))
                .collect::<Vec<_>>();
            match points.len() {
                0 => None,
                1 => points.pop().map(Value::Point),
                _ => Some(Value::MultiPoint(points)),
            }
        }
        GeomType::LineString => {
            let mut lines = rings.iter().map(|ring| project(ring.as_slice())).collect::<Vec<_>>();
            match lines.len() {
                0 => None,
                1 => lines.pop().map(Value::LineString),
                _ => Some(Value::MultiLineString(lines)),
            }
        }
        GeomType::Polygon => {
            let mut polygons = Vec::<Vec<Vec<Vec<f64>>>>::new();
            for ring in rings {
                let area = signed_area(ring);
                if area == 0 {
                    continue;
                }
                let mut closed = ring.clone();
                close_ring(&mut closed);
                let projected = project(closed.as_slice());
                match polygons.last_mut() {
                    Some(polygon) if area < 0 => polygon.push(projected),
                    _ => polygons.push(vec![projected]),
                }
            }
            match polygons.len() {
                0 => None,
                1 => polygons.pop().map(Value::Polygon),
                _ => Some(Value::MultiPolygon(polygons)),
            }
        }
    }
}

/// Twice the signed ring area in tile space (y down); exterior rings are positive.
fn signed_area(ring: &[i32]) -> i64 {
    let points = ring
        .chunks_exact(2)
        .map(|pair| (pair[0] as i64, pair[1] as i64))
        .collect::<Vec<_>>();
    let mut sum = 0;
    for (idx, (x1, y1)) in points.iter().enumerate() {
        let (x2, y2) = points[(idx + 1) % points.len()];
        sum += x1 * y2 - x2 * y1;
    }
    sum
}

/// Quantize per-layer collections back into the local grid of `coord` at `extent`.
pub fn from_geojson(
    layers: &LayerCollections,
    coord: TileCoord,
    extent: u32,
) -> Result<StructuredTile> {
    let mut tile = StructuredTile::default();
    for (name, collection) in layers {
        tile.layers
            .push(layer_from_geojson(name, collection, coord, extent)?);
    }
    Ok(tile)
}

pub fn layer_from_geojson(
    name: &str,
    collection: &FeatureCollection,
    coord: TileCoord,
    extent: u32,
) -> Result<Layer> {
    let quantize = |position: &Vec<f64>| quantize_position(coord, extent, position);
    let quantize_ring = |positions: &Vec<Vec<f64>>| quantize_positions(coord, extent, positions);

    let mut layer = Layer::new(name, extent);
    let mut dictionary = LayerDictionary::default();
    for feature in collection.features.iter() {
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        let (geom_type, geometry) = match &geometry.value {
            Value::Point(position) => (GeomType::Point, vec![quantize(position)?.to_vec()]),
            Value::MultiPoint(positions) => (
                GeomType::Point,
                positions
                    .iter()
                    .map(|position| quantize(position).map(|pair| pair.to_vec()))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::LineString(positions) => (GeomType::LineString, vec![quantize_ring(positions)?]),
            Value::MultiLineString(lines) => (
                GeomType::LineString,
                lines
                    .iter()
                    .map(|line| quantize_ring(line))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Polygon(rings) => (GeomType::Polygon, polygon_rings(coord, extent, rings)?),
            Value::MultiPolygon(polygons) => {
                let mut rings = Vec::new();
                for polygon in polygons {
                    rings.extend(polygon_rings(coord, extent, polygon)?);
                }
                (GeomType::Polygon, rings)
            }
            Value::GeometryCollection(_) => {
                return Err(Error::UnsupportedGeometry(format!(
                    "GeometryCollection in layer {name}"
                )));
            }
        };

        let mut tags = Vec::new();
        if let Some(properties) = feature.properties.as_ref() {
            for (key, value) in properties {
                if let Some(value) = TileValue::from_json(value) {
                    tags.extend(dictionary.tag(key, value));
                }
            }
        }
        let id = match feature.id.as_ref() {
            Some(geojson::feature::Id::Number(number)) => number.as_u64(),
            _ => None,
        };
        layer.features.push(Feature {
            id,
            geom_type,
            tags,
            geometry,
        });
    }
    let (keys, values) = dictionary.into_parts();
    layer.keys = keys;
    layer.values = values;
    Ok(layer)
}

fn quantize_position(coord: TileCoord, extent: u32, position: &[f64]) -> Result<[i32; 2]> {
    let [lon, lat, ..] = position[..] else {
        return Err(Error::UnsupportedGeometry(format!(
            "position with {} ordinates",
            position.len()
        )));
    };
    let (x, y) = geo_to_normalized(lon, lat);
    let (local_x, local_y) = normalized_to_local(coord.zoom, coord.x, coord.y, extent, x, y);
    Ok([local_x.round() as i32, local_y.round() as i32])
}

fn quantize_positions(coord: TileCoord, extent: u32, positions: &[Vec<f64>]) -> Result<Vec<i32>> {
    let mut ring = Vec::with_capacity(positions.len() * 2);
    for position in positions {
        ring.extend(quantize_position(coord, extent, position)?);
    }
    Ok(ring)
}

// Exterior rings come out with positive area and holes negative, whatever the input winding.
fn polygon_rings(coord: TileCoord, extent: u32, rings: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<i32>>> {
    let mut out = Vec::with_capacity(rings.len());
    for (idx, positions) in rings.iter().enumerate() {
        let mut ring = quantize_positions(coord, extent, positions)?;
        close_ring(&mut ring);
        let area = signed_area(&ring);
        if (idx == 0 && area < 0) || (idx > 0 && area > 0) {
            reverse_ring(&mut ring);
        }
        out.push(ring);
    }
    Ok(out)
}

fn reverse_ring(ring: &mut [i32]) {
    let pairs = ring.len() / 2;
    for idx in 0..pairs / 2 {
        let other = pairs - 1 - idx;
        ring.swap(idx * 2, other * 2);
        ring.swap(idx * 2 + 1, other * 2 + 1);
    }
}

/// Number of positions across every geometry of the collection.
pub fn count_positions(collection: &FeatureCollection) -> usize {
    collection
        .features
        .iter()
        .filter_map(|feature| feature.geometry.as_ref())
        .map(|geometry| value_positions(&geometry.value))
        .sum()
}

fn value_positions(value: &Value) -> usize {
    match value {
        Value::Point(_) => 1,
        Value::MultiPoint(points) | Value::LineString(points) => points.len(),
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().map(Vec::len).sum()
        }
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .flat_map(|polygon| polygon.iter())
            .map(Vec::len)
            .sum(),
        Value::GeometryCollection(geometries) => geometries
            .iter()
            .map(|geometry| value_positions(&geometry.value))
            .sum(),
    }
}
