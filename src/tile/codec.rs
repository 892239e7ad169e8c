use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;
use geo_types::{Coord, Geometry, LineString};
use mvt::{GeomData, GeomEncoder, Tile};
use mvt_reader::Reader;

use crate::error::{Error, Result};
use crate::tile::types::{
    Feature, GeomType, Layer, LayerDictionary, StructuredTile, TileValue, close_ring,
};

/// Decompress a stored blob and parse it into a [`StructuredTile`].
pub fn decode_tile(data: &[u8]) -> Result<StructuredTile> {
    let payload = decode_tile_payload(data)?;
    parse_tile(payload)
}

/// Serialize a tile and gzip it at the best compression level.
pub fn encode_tile(tile: &StructuredTile) -> Result<Vec<u8>> {
    let payload = serialize_tile(tile)?;
    encode_tile_payload(&payload)
}

/// Inflate gzip or zlib data; anything else is assumed to be an uncompressed payload.
pub fn decode_tile_payload(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    if data.starts_with(&[0x1f, 0x8b]) {
        GzDecoder::new(data)
            .read_to_end(&mut decoded)
            .map_err(|err| Error::corrupt(format!("decode gzip tile data: {err}")))?;
    } else if is_zlib_header(data) {
        ZlibDecoder::new(data)
            .read_to_end(&mut decoded)
            .map_err(|err| Error::corrupt(format!("decode zlib tile data: {err}")))?;
    } else {
        decoded.extend_from_slice(data);
    }
    Ok(decoded)
}

pub fn encode_tile_payload(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn is_zlib_header(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => {
            cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0
        }
        _ => false,
    }
}

pub fn parse_tile(payload: Vec<u8>) -> Result<StructuredTile> {
    if payload.is_empty() {
        return Ok(StructuredTile::default());
    }
    let reader = Reader::new(payload)
        .map_err(|err| Error::corrupt(format!("decode vector tile: {err}")))?;
    let metadata = reader
        .get_layer_metadata()
        .map_err(|err| Error::corrupt(format!("read layer metadata: {err}")))?;

    let mut layers = Vec::with_capacity(metadata.len());
    for meta in metadata {
        let features = reader
            .get_features(meta.layer_index)
            .map_err(|err| Error::corrupt(format!("read layer {} features: {err}", meta.name)))?;
        let mut dictionary = LayerDictionary::default();
        let mut decoded = Vec::with_capacity(features.len());
        for feature in features {
            let (geom_type, geometry) = rings_from_geometry(&feature.geometry)?;
            let mut tags = Vec::new();
            if let Some(props) = feature.properties {
                let mut props = props.into_iter().collect::<Vec<_>>();
                props.sort_by(|a, b| a.0.cmp(&b.0));
                for (key, value) in props {
                    if let Some(value) = tile_value_from_reader(value) {
                        tags.extend(dictionary.tag(&key, value));
                    }
                }
            }
            decoded.push(Feature {
                id: feature.id,
                geom_type,
                tags,
                geometry,
            });
        }
        let (keys, values) = dictionary.into_parts();
        layers.push(Layer {
            name: meta.name,
            extent: meta.extent,
            features: decoded,
            keys,
            values,
        });
    }
    Ok(StructuredTile { layers })
}

/// Serialize to the uncompressed protobuf message.
///
/// The message carries one extent, the largest of the layers; coordinates of
/// layers with a smaller extent are scaled up to it.
pub fn serialize_tile(tile: &StructuredTile) -> Result<Vec<u8>> {
    let extent = tile.extent();
    let mut out = Tile::new(extent);
    for layer in tile.layers.iter() {
        if layer.extent == 0 {
            return Err(Error::corrupt(format!("layer {} has a zero extent", layer.name)));
        }
        let scale = f64::from(extent) / f64::from(layer.extent);
        let mut layer_builder = out.create_layer(&layer.name);
        for feature in layer.features.iter() {
            let geom_data = encode_feature_geometry(feature, scale)?;
            let mut feature_builder = layer_builder.into_feature(geom_data);
            if let Some(id) = feature.id {
                feature_builder.set_id(id);
            }
            for (key, value) in layer.properties(feature) {
                match value {
                    TileValue::String(text) => feature_builder.add_tag_string(key, text),
                    TileValue::Float(val) => feature_builder.add_tag_float(key, *val),
                    TileValue::Double(val) => feature_builder.add_tag_double(key, *val),
                    TileValue::Int(val) => feature_builder.add_tag_int(key, *val),
                    TileValue::UInt(val) => feature_builder.add_tag_uint(key, *val),
                    TileValue::SInt(val) => feature_builder.add_tag_sint(key, *val),
                    TileValue::Bool(val) => feature_builder.add_tag_bool(key, *val),
                }
            }
            layer_builder = feature_builder.into_layer();
        }
        out.add_layer(layer_builder)
            .map_err(|err| Error::corrupt(format!("add layer {}: {err}", layer.name)))?;
    }
    out.to_bytes()
        .map_err(|err| Error::corrupt(format!("encode vector tile: {err}")))
}

fn tile_value_from_reader(value: mvt_reader::feature::Value) -> Option<TileValue> {
    match value {
        mvt_reader::feature::Value::String(text) => Some(TileValue::String(text)),
        mvt_reader::feature::Value::Float(val) => Some(TileValue::Float(val)),
        mvt_reader::feature::Value::Double(val) => Some(TileValue::Double(val)),
        mvt_reader::feature::Value::Int(val) => Some(TileValue::Int(val)),
        mvt_reader::feature::Value::UInt(val) => Some(TileValue::UInt(val)),
        mvt_reader::feature::Value::SInt(val) => Some(TileValue::SInt(val)),
        mvt_reader::feature::Value::Bool(val) => Some(TileValue::Bool(val)),
        mvt_reader::feature::Value::Null => None,
    }
}

fn rings_from_geometry(geometry: &Geometry<f32>) -> Result<(GeomType, Vec<Vec<i32>>)> {
    match geometry {
        Geometry::Point(point) => Ok((GeomType::Point, vec![flatten(&[point.0])])),
        Geometry::MultiPoint(points) => Ok((
            GeomType::Point,
            points.iter().map(|point| flatten(&[point.0])).collect(),
        )),
        Geometry::LineString(line) => Ok((GeomType::LineString, vec![flatten(&line.0)])),
        Geometry::Line(line) => Ok((GeomType::LineString, vec![flatten(&[line.start, line.end])])),
        Geometry::MultiLineString(lines) => Ok((
            GeomType::LineString,
            lines.iter().map(|line| flatten(&line.0)).collect(),
        )),
        Geometry::Polygon(polygon) => {
            let mut rings = vec![closed_ring(polygon.exterior())];
            rings.extend(polygon.interiors().iter().map(closed_ring));
            Ok((GeomType::Polygon, rings))
        }
        Geometry::MultiPolygon(polygons) => {
            let mut rings = Vec::new();
            for polygon in polygons.iter() {
                rings.push(closed_ring(polygon.exterior()));
                rings.extend(polygon.interiors().iter().map(closed_ring));
            }
            Ok((GeomType::Polygon, rings))
        }
        Geometry::Rect(_) | Geometry::Triangle(_) | Geometry::GeometryCollection(_) => Err(
            Error::corrupt("unexpected geometry kind in vector tile feature"),
        ),
    }
}

fn flatten(coords: &[Coord<f32>]) -> Vec<i32> {
    coords
        .iter()
        .flat_map(|coord| [coord.x.round() as i32, coord.y.round() as i32])
        .collect()
}

fn closed_ring(line: &LineString<f32>) -> Vec<i32> {
    let mut ring = flatten(&line.0);
    close_ring(&mut ring);
    ring
}

fn encode_feature_geometry(feature: &Feature, scale: f64) -> Result<GeomData> {
    if feature.geometry.iter().any(|ring| ring.len() % 2 != 0) {
        return Err(Error::corrupt("geometry ring has an odd coordinate count"));
    }
    let rings = feature
        .geometry
        .iter()
        .filter(|ring| !ring.is_empty())
        .collect::<Vec<_>>();
    let mut encoder = GeomEncoder::new(match feature.geom_type {
        GeomType::Point => mvt::GeomType::Point,
        GeomType::LineString => mvt::GeomType::Linestring,
        GeomType::Polygon => mvt::GeomType::Polygon,
    });
    for (idx, ring) in rings.iter().enumerate() {
        let coords = match feature.geom_type {
            GeomType::Polygon => open_ring(ring),
            _ => ring.as_slice(),
        };
        for pair in coords.chunks_exact(2) {
            let x = (f64::from(pair[0]) * scale).round() as f32;
            let y = (f64::from(pair[1]) * scale).round() as f32;
            encoder.add_point(x, y).map_err(geom_err)?;
        }
        if feature.geom_type != GeomType::Point && idx + 1 < rings.len() {
            encoder.complete_geom().map_err(geom_err)?;
        }
    }
    encoder.encode().map_err(geom_err)
}

fn geom_err(err: impl std::fmt::Display) -> Error {
    Error::corrupt(format!("encode geometry: {err}"))
}

// The encoder emits ClosePath itself, so the repeated first vertex is dropped.
fn open_ring(ring: &[i32]) -> &[i32] {
    let len = ring.len();
    if len > 2 && ring[..2] == ring[len - 2..] {
        &ring[..len - 2]
    } else {
        ring
    }
}
