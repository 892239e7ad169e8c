use std::io::Write;

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use mvt::{GeomEncoder, GeomType, Tile};

use vt_slim::Error;
use vt_slim::tile::{
    Feature, GeomType as TileGeomType, Layer, LayerDictionary, StructuredTile, TileValue,
    decode_tile, decode_tile_payload, encode_tile, parse_tile,
};

fn create_tile() -> Vec<u8> {
    let mut tile = Tile::new(4096);

    let layer = tile.create_layer("roads");
    let geom = GeomEncoder::new(GeomType::Linestring)
        .point(10.0, 10.0)
        .expect("point")
        .point(200.0, 50.0)
        .expect("point")
        .encode()
        .expect("encode");
    let mut feature = layer.into_feature(geom);
    feature.set_id(7);
    feature.add_tag_string("class", "primary");
    feature.add_tag_uint("lanes", 2);
    let layer = feature.into_layer();
    tile.add_layer(layer).expect("add roads");

    let layer = tile.create_layer("pois");
    let geom = GeomEncoder::new(GeomType::Point)
        .point(3.0, 4.0)
        .expect("point")
        .encode()
        .expect("encode");
    let mut feature = layer.into_feature(geom);
    feature.add_tag_bool("open", true);
    let layer = feature.into_layer();
    tile.add_layer(layer).expect("add pois");

    tile.to_bytes().expect("tile bytes")
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("zlib write");
    encoder.finish().expect("zlib finish")
}

fn square_layer() -> Layer {
    let mut dictionary = LayerDictionary::default();
    let tags = dictionary.tag("kind", TileValue::String("lake".to_string()));
    let (keys, values) = dictionary.into_parts();
    Layer {
        name: "water".to_string(),
        extent: 4096,
        features: vec![Feature {
            id: Some(42),
            geom_type: TileGeomType::Polygon,
            tags: tags.to_vec(),
            geometry: vec![
                vec![0, 0, 100, 0, 100, 100, 0, 100, 0, 0],
                vec![20, 20, 20, 80, 80, 80, 80, 20, 20, 20],
            ],
        }],
        keys,
        values,
    }
}

#[test]
fn decode_raw_gzip_and_zlib_payloads() {
    let raw = create_tile();
    let from_raw = decode_tile(&raw).expect("raw");
    let from_gzip = decode_tile(&gzip(&raw)).expect("gzip");
    let from_zlib = decode_tile(&zlib(&raw)).expect("zlib");
    assert_eq!(from_raw, from_gzip);
    assert_eq!(from_raw, from_zlib);
    assert_eq!(from_raw.layer_names(), vec!["roads", "pois"]);
}

#[test]
fn decode_keeps_ids_properties_and_geometry() {
    let tile = decode_tile(&create_tile()).expect("decode");
    let roads = tile.layer("roads").expect("roads");
    assert_eq!(roads.extent, 4096);
    assert_eq!(roads.features.len(), 1);
    let feature = &roads.features[0];
    assert_eq!(feature.id, Some(7));
    assert_eq!(feature.geom_type, TileGeomType::LineString);
    assert_eq!(feature.geometry, vec![vec![10, 10, 200, 50]]);
    let props = roads.properties(feature);
    assert_eq!(
        props,
        vec![
            ("class", &TileValue::String("primary".to_string())),
            ("lanes", &TileValue::UInt(2)),
        ]
    );

    let pois = tile.layer("pois").expect("pois");
    assert_eq!(pois.features[0].geom_type, TileGeomType::Point);
    assert_eq!(pois.features[0].geometry, vec![vec![3, 4]]);
    assert_eq!(tile.feature_count(), 2);
    assert_eq!(tile.vertex_count(), 3);
}

#[test]
fn encode_round_trip_preserves_tile() {
    let tile = decode_tile(&create_tile()).expect("decode");
    let encoded = encode_tile(&tile).expect("encode");
    assert_eq!(&encoded[..2], &[0x1f, 0x8b]);
    let decoded = decode_tile(&encoded).expect("decode again");
    assert_eq!(decoded, tile);
}

#[test]
fn polygon_with_hole_round_trips() {
    let tile = StructuredTile {
        layers: vec![square_layer()],
    };
    let decoded = decode_tile(&encode_tile(&tile).expect("encode")).expect("decode");
    let water = decoded.layer("water").expect("water");
    assert_eq!(water.features[0].id, Some(42));
    assert_eq!(water.features[0].geom_type, TileGeomType::Polygon);
    assert_eq!(water.features[0].geometry, tile.layers[0].features[0].geometry);
    assert_eq!(water.values, vec![TileValue::String("lake".to_string())]);
}

fn point_layer(name: &str, extent: u32, x: i32, y: i32) -> Layer {
    let mut layer = Layer::new(name, extent);
    layer.features.push(Feature {
        id: None,
        geom_type: TileGeomType::Point,
        tags: Vec::new(),
        geometry: vec![vec![x, y]],
    });
    layer
}

#[test]
fn mixed_extents_are_scaled_to_the_largest() {
    let tile = StructuredTile {
        layers: vec![point_layer("b", 512, 500, 250), point_layer("a", 4096, 4000, 4000)],
    };
    assert_eq!(tile.extent(), 4096);
    let decoded = decode_tile(&encode_tile(&tile).expect("encode")).expect("decode");
    let extents = decoded.layers.iter().map(|layer| layer.extent).collect::<Vec<_>>();
    assert_eq!(extents, vec![4096, 4096]);
    let b = decoded.layer("b").expect("b");
    assert_eq!(b.features[0].geometry, vec![vec![4000, 2000]]);
    let a = decoded.layer("a").expect("a");
    assert_eq!(a.features[0].geometry, vec![vec![4000, 4000]]);
}

#[test]
fn zero_extent_layer_is_rejected() {
    let tile = StructuredTile {
        layers: vec![point_layer("flat", 0, 1, 1)],
    };
    let err = encode_tile(&tile).expect_err("zero extent");
    assert!(matches!(err, Error::CorruptTile { .. }), "{err:?}");
}

#[test]
fn empty_payload_is_empty_tile() {
    let tile = parse_tile(Vec::new()).expect("empty");
    assert!(tile.is_empty());
    assert_eq!(tile.extent(), 4096);
}

#[test]
fn invalid_gzip_stream_is_corrupt() {
    let data = [0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
    let err = decode_tile(&data).expect_err("invalid deflate block");
    assert!(matches!(err, Error::CorruptTile { .. }), "{err:?}");
}

#[test]
fn odd_coordinate_count_is_rejected() {
    let mut layer = Layer::new("broken", 4096);
    layer.features.push(Feature {
        id: None,
        geom_type: TileGeomType::LineString,
        tags: Vec::new(),
        geometry: vec![vec![1, 2, 3]],
    });
    let tile = StructuredTile {
        layers: vec![layer],
    };
    let err = encode_tile(&tile).expect_err("odd ring");
    assert!(matches!(err, Error::CorruptTile { .. }), "{err:?}");
}

#[test]
fn uncompressed_payload_passes_through() {
    let raw = create_tile();
    assert_eq!(decode_tile_payload(&raw).expect("raw"), raw);
}

#[test]
fn dictionary_interns_repeated_tags() {
    let mut dictionary = LayerDictionary::default();
    let first = dictionary.tag("class", TileValue::String("a".to_string()));
    let second = dictionary.tag("class", TileValue::String("a".to_string()));
    let third = dictionary.tag("name", TileValue::String("a".to_string()));
    assert_eq!(first, second);
    assert_eq!(third, [1, 0]);
    let (keys, values) = dictionary.into_parts();
    assert_eq!(keys, vec!["class".to_string(), "name".to_string()]);
    assert_eq!(values.len(), 1);
}

#[test]
fn layer_helpers_find_replace_and_remove() {
    let mut tile = decode_tile(&create_tile()).expect("decode");
    tile.replace_layer(Layer::new("pois", 4096));
    assert_eq!(tile.layer_names(), vec!["roads", "pois"]);
    assert!(tile.layer("pois").expect("pois").features.is_empty());

    let removed = tile.remove_layer("roads").expect("roads");
    assert_eq!(removed.features.len(), 1);
    assert!(tile.remove_layer("roads").is_none());
    tile.replace_layer(square_layer());
    assert_eq!(tile.layer_names(), vec!["pois", "water"]);
}
