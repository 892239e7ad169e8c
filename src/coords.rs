//! Conversions between geographic, normalized and tile-local coordinates.
//!
//! The normalized space is the spherical Web Mercator world mapped onto the
//! unit square, `x` growing east and `y` growing south. Tile rows here are in
//! the XYZ scheme (row 0 at the top); callers holding MBTiles (TMS) rows flip
//! them first, see [`crate::mbtiles::TileKey::to_coord`].

use std::f64::consts::PI;

/// Longitude/latitude in degrees to the normalized unit square.
///
/// `y` is clamped to `[0, 1]`, which loses precision beyond the Mercator
/// latitude limit (about ±85.0511°).
pub fn geo_to_normalized(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon / 360.0 + 0.5;
    let sin = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    (x, y.clamp(0.0, 1.0))
}

pub fn normalized_to_geo(x: f64, y: f64) -> (f64, f64) {
    let lon = (x - 0.5) * 360.0;
    let lat = (2.0 * ((0.5 - y) * 2.0 * PI).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Normalized point to the local grid of tile `(zoom, column, row)` with the given extent.
///
/// The result is unrounded; points outside the tile footprint map outside `[0, extent)`.
pub fn normalized_to_local(
    zoom: u8,
    column: u32,
    row: u32,
    extent: u32,
    x: f64,
    y: f64,
) -> (f64, f64) {
    let scale = tiles_per_side(zoom);
    let extent = extent as f64;
    (
        (x * scale - column as f64) * extent,
        (y * scale - row as f64) * extent,
    )
}

pub fn local_to_normalized(
    zoom: u8,
    column: u32,
    row: u32,
    extent: u32,
    local_x: f64,
    local_y: f64,
) -> (f64, f64) {
    let scale = tiles_per_side(zoom);
    let extent = extent as f64;
    (
        (local_x / extent + column as f64) / scale,
        (local_y / extent + row as f64) / scale,
    )
}

/// North-west corner of a slippy-map tile.
pub fn tile_to_geo(zoom: u8, column: u32, row: u32) -> (f64, f64) {
    let scale = tiles_per_side(zoom);
    normalized_to_geo(column as f64 / scale, row as f64 / scale)
}

pub fn tile_to_geo_center(zoom: u8, column: u32, row: u32) -> (f64, f64) {
    let scale = tiles_per_side(zoom);
    normalized_to_geo(
        (column as f64 + 0.5) / scale,
        (row as f64 + 0.5) / scale,
    )
}

/// Slippy-map tile `(column, row)` containing the point, clamped to the pyramid.
pub fn geo_to_tile(zoom: u8, lon: f64, lat: f64) -> (u32, u32) {
    let (x, y) = geo_to_normalized(lon, lat);
    let scale = tiles_per_side(zoom);
    let max_index = scale - 1.0;
    let column = (x * scale).floor().clamp(0.0, max_index);
    let row = (y * scale).floor().clamp(0.0, max_index);
    (column as u32, row as u32)
}

fn tiles_per_side(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}
