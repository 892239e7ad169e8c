use std::collections::BTreeSet;
use std::path::Path;

use mvt::{GeomEncoder, GeomType, Tile};
use serde_json::json;

use vt_slim::Error;
use vt_slim::mbtiles::{
    PruneStats, SLIM_BOUNDS, SlimOptions, StoreOptions, TileKey, TileStore, default_slim_output,
    prune_tile_layers, slim_mbtiles,
};
use vt_slim::progress::SlimProgress;
use vt_slim::style::MapboxStyle;
use vt_slim::tile::decode_tile;

fn create_tile(layers: &[&str]) -> Vec<u8> {
    let mut tile = Tile::new(4096);
    for name in layers {
        let layer = tile.create_layer(name);
        let geom = GeomEncoder::new(GeomType::Point)
            .point(1.0, 2.0)
            .expect("point")
            .encode()
            .expect("encode");
        let mut feature = layer.into_feature(geom);
        feature.add_tag_string("name", name);
        let layer = feature.into_layer();
        tile.add_layer(layer).expect("add layer");
    }
    tile.to_bytes().expect("tile bytes")
}

fn create_mbtiles(path: &Path, tiles: &[(u8, u32, u32, Vec<u8>)]) {
    let conn = rusqlite::Connection::open(path).expect("open");
    conn.execute_batch(
        "
        CREATE TABLE metadata (name TEXT, value TEXT);
        CREATE TABLE tiles (
            zoom_level INTEGER,
            tile_column INTEGER,
            tile_row INTEGER,
            tile_data BLOB
        );
        INSERT INTO metadata (name, value) VALUES ('bounds', '130,30,140,40');
        ",
    )
    .expect("schema");
    for (zoom, column, row, data) in tiles {
        conn.execute(
            "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
            (zoom, column, row, data),
        )
        .expect("tile insert");
    }
}

fn roads_until_zoom_5() -> MapboxStyle {
    MapboxStyle::from_value(&json!({
        "version": 8,
        "layers": [
            { "id": "water", "type": "fill", "source": "osm", "source-layer": "water" },
            { "id": "roads", "type": "line", "source": "osm", "source-layer": "roads", "maxzoom": 5 }
        ]
    }))
    .expect("style")
}

fn fixture(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("planet.mbtiles");
    create_mbtiles(
        &path,
        &[
            (3, 0, 0, create_tile(&["water", "roads"])),
            (5, 0, 0, create_tile(&["water", "roads"])),
            (5, 1, 0, create_tile(&["roads"])),
        ],
    );
    path
}

#[test]
fn prune_drops_hidden_layers() {
    let style = roads_until_zoom_5();
    let mut tile = decode_tile(&create_tile(&["water", "roads", "buildings"])).expect("decode");
    let mut stats = PruneStats::default();
    assert!(prune_tile_layers(&mut tile, 5, &style, &mut stats));
    assert_eq!(tile.layer_names(), vec!["water"]);
    assert_eq!(stats.removed_features_by_zoom.get(&5), Some(&2));
    assert_eq!(stats.removed_layers_by_zoom.len(), 2);

    let mut untouched = decode_tile(&create_tile(&["water", "roads"])).expect("decode");
    assert!(!prune_tile_layers(&mut untouched, 4, &style, &mut stats));
    assert_eq!(untouched.layers.len(), 2);
}

#[test]
fn slim_rewrites_deletes_and_sets_bounds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let style = roads_until_zoom_5();
    let mut events = Vec::new();
    let outcome = slim_mbtiles(
        &input,
        None,
        &style,
        &SlimOptions::default(),
        &mut |event: &SlimProgress| events.push(*event),
    )
    .expect("slim");

    assert_eq!(outcome.output, dir.path().join("planet_out.mbtiles"));
    let report = &outcome.report;
    assert_eq!(report.tiles_processed, 3);
    assert_eq!(report.tiles_updated, 1);
    assert_eq!(report.tiles_deleted, 1);
    assert_eq!(report.tiles_unchanged, 1);
    assert_eq!(report.prune.removed_features_by_zoom.get(&5), Some(&2));
    assert_eq!(
        report.prune.removed_layers_by_zoom.get("roads"),
        Some(&BTreeSet::from([5]))
    );

    assert_eq!(
        events,
        vec![
            SlimProgress {
                zoom: 3,
                processed: 0,
                total: 3,
                removed_features: 0,
            },
            SlimProgress {
                zoom: 5,
                processed: 1,
                total: 3,
                removed_features: 1,
            },
        ]
    );

    let store = TileStore::open(&outcome.output, StoreOptions::read()).expect("open output");
    assert_eq!(
        store.list_tile_keys().expect("keys"),
        vec![TileKey::new(3, 0, 0), TileKey::new(5, 0, 0)]
    );
    let slimmed = store.read_structured_tile(TileKey::new(5, 0, 0)).expect("tile");
    assert_eq!(slimmed.layer_names(), vec!["water"]);
    let kept = store.read_structured_tile(TileKey::new(3, 0, 0)).expect("tile");
    assert_eq!(kept.layer_names(), vec!["water", "roads"]);
    assert_eq!(
        store.metadata().get("bounds").map(String::as_str),
        Some(SLIM_BOUNDS)
    );

    let original = TileStore::open(&input, StoreOptions::read()).expect("open input");
    assert_eq!(original.list_tile_keys().expect("keys").len(), 3);
    assert_eq!(
        original.metadata().get("bounds").map(String::as_str),
        Some("130,30,140,40")
    );
}

#[test]
fn slim_writes_to_explicit_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let output = dir.path().join("slim.mbtiles");
    let outcome = slim_mbtiles(
        &input,
        Some(&output),
        &roads_until_zoom_5(),
        &SlimOptions::default(),
        &mut |_: &SlimProgress| {},
    )
    .expect("slim");
    assert_eq!(outcome.output, output);
    assert!(output.is_file());
    assert!(!dir.path().join("planet_out.mbtiles").exists());
}

#[test]
fn slim_rejects_output_equal_to_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    let err = slim_mbtiles(
        &input,
        Some(&input),
        &roads_until_zoom_5(),
        &SlimOptions::default(),
        &mut |_: &SlimProgress| {},
    )
    .expect_err("same path");
    assert!(matches!(err, Error::StoreOpen { .. }), "{err:?}");
}

#[test]
fn slim_rejects_output_aliasing_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = fixture(dir.path());
    std::fs::create_dir(dir.path().join("sub")).expect("subdir");
    let alias = dir.path().join("sub").join("..").join("planet.mbtiles");
    let err = slim_mbtiles(
        &input,
        Some(&alias),
        &roads_until_zoom_5(),
        &SlimOptions::default(),
        &mut |_: &SlimProgress| {},
    )
    .expect_err("aliased path");
    assert!(matches!(err, Error::StoreOpen { .. }), "{err:?}");

    let original = TileStore::open(&input, StoreOptions::read()).expect("input still there");
    assert_eq!(original.list_tile_keys().expect("keys").len(), 3);
}

#[test]
fn slim_keeps_shared_images_of_other_zooms() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("dedup.mbtiles");
    let conn = rusqlite::Connection::open(&input).expect("open");
    conn.execute_batch(
        "
        CREATE TABLE metadata (name TEXT, value TEXT);
        CREATE TABLE map (
            zoom_level INTEGER,
            tile_column INTEGER,
            tile_row INTEGER,
            tile_id TEXT
        );
        CREATE TABLE images (tile_data BLOB, tile_id TEXT);
        INSERT INTO map VALUES (3, 0, 0, 'shared');
        INSERT INTO map VALUES (5, 0, 0, 'shared');
        ",
    )
    .expect("schema");
    conn.execute(
        "INSERT INTO images (tile_data, tile_id) VALUES (?1, 'shared')",
        [create_tile(&["water", "roads"])],
    )
    .expect("image insert");
    drop(conn);

    let outcome = slim_mbtiles(
        &input,
        None,
        &roads_until_zoom_5(),
        &SlimOptions::default(),
        &mut |_: &SlimProgress| {},
    )
    .expect("slim");
    assert_eq!(outcome.report.tiles_updated, 1);

    let store = TileStore::open(&outcome.output, StoreOptions::read()).expect("open output");
    let low = store.read_structured_tile(TileKey::new(3, 0, 0)).expect("z3");
    assert_eq!(low.layer_names(), vec!["water", "roads"]);
    let high = store.read_structured_tile(TileKey::new(5, 0, 0)).expect("z5");
    assert_eq!(high.layer_names(), vec!["water"]);
    store.close().expect("close");

    let conn = rusqlite::Connection::open(&outcome.output).expect("open");
    let images: i64 = conn
        .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
        .expect("count images");
    assert_eq!(images, 2);
}

#[test]
fn slim_missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = slim_mbtiles(
        &dir.path().join("missing.mbtiles"),
        None,
        &roads_until_zoom_5(),
        &SlimOptions::default(),
        &mut |_: &SlimProgress| {},
    )
    .expect_err("missing input");
    assert!(matches!(err, Error::StoreOpen { .. }), "{err:?}");
    assert!(!dir.path().join("missing_out.mbtiles").exists());
}

#[test]
fn slim_failure_removes_partial_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("broken.mbtiles");
    create_mbtiles(
        &input,
        &[
            (3, 0, 0, create_tile(&["water"])),
            (4, 0, 0, vec![0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff, 0xff]),
        ],
    );
    let err = slim_mbtiles(
        &input,
        None,
        &roads_until_zoom_5(),
        &SlimOptions::default(),
        &mut |_: &SlimProgress| {},
    )
    .expect_err("corrupt tile");
    match err {
        Error::CorruptTile { tile, .. } => assert_eq!(tile, Some(TileKey::new(4, 0, 0))),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!dir.path().join("broken_out.mbtiles").exists());
}

#[test]
fn default_output_sits_next_to_input() {
    assert_eq!(
        default_slim_output(Path::new("/data/tokyo.mbtiles")),
        Path::new("/data/tokyo_out.mbtiles")
    );
}
