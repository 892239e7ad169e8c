use std::fmt;

use anyhow::{Context, Result};
use serde::Serialize;

/// Tiles whose stored blob exceeds this many kilobytes count as oversized.
pub const DEFAULT_TILE_SIZE_LIMIT_KB: f64 = 500.0;

/// Bounds written to the metadata table by a slim pass.
pub const SLIM_BOUNDS: &str = "-180.0,-85.0511,180.0,85.0511";

/// Address of one stored tile. `row` is the TMS row as persisted (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileKey {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TileKey {
    pub fn new(zoom: u8, column: u32, row: u32) -> Self {
        Self { zoom, column, row }
    }

    pub fn to_coord(self) -> TileCoord {
        TileCoord {
            zoom: self.zoom,
            x: self.column,
            y: flip_row(self.zoom, self.row),
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// XYZ (slippy map) address, row 0 at the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn to_key(self) -> TileKey {
        TileKey {
            zoom: self.zoom,
            column: self.x,
            row: flip_row(self.zoom, self.y),
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

// Zoom levels past 63 only come from malformed stores; the row count saturates.
fn flip_row(zoom: u8, row: u32) -> u32 {
    let max_row = 1u64
        .checked_shl(u32::from(zoom))
        .map_or(u64::MAX, |rows| rows - 1);
    max_row
        .saturating_sub(u64::from(row))
        .min(u64::from(u32::MAX)) as u32
}

pub fn parse_tile_spec(value: &str) -> Result<TileCoord> {
    let trimmed = value.trim();
    let mut parts = trimmed.split('/');
    let zoom_str = parts.next().context("tile must be in z/x/y format")?;
    let x_str = parts.next().context("tile must be in z/x/y format")?;
    let y_str = parts.next().context("tile must be in z/x/y format")?;
    if parts.next().is_some() {
        anyhow::bail!("tile must be in z/x/y format");
    }
    let zoom: u8 = zoom_str.parse().context("invalid tile zoom")?;
    let x: u32 = x_str.parse().context("invalid tile x")?;
    let y: u32 = y_str.parse().context("invalid tile y")?;
    if zoom > 30 {
        anyhow::bail!("tile zoom must be 30 or lower");
    }
    Ok(TileCoord { zoom, x, y })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Read,
    Write,
}

/// Physical layout of the tile data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchemaVariant {
    /// `tiles(zoom_level, tile_column, tile_row, tile_data)`.
    Tiles,
    /// `map(zoom_level, tile_column, tile_row, tile_id)` joined to `images(tile_id, tile_data)`.
    MapImages,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub access: AccessMode,
    /// Overrides the variant detected from the tables present.
    pub schema: Option<SchemaVariant>,
    /// Read every blob into memory right after opening.
    pub load_in_memory: bool,
    pub vacuum_after_write: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            access: AccessMode::Read,
            schema: None,
            load_in_memory: false,
            vacuum_after_write: true,
        }
    }
}

impl StoreOptions {
    pub fn read() -> Self {
        Self::default()
    }

    pub fn write() -> Self {
        Self {
            access: AccessMode::Write,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlimOptions {
    pub store: StoreOptions,
    /// Emit a progress event every this many tiles, besides every zoom change.
    pub progress_interval: u64,
}

impl Default for SlimOptions {
    fn default() -> Self {
        Self {
            store: StoreOptions {
                load_in_memory: true,
                ..StoreOptions::write()
            },
            progress_interval: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    pub store: StoreOptions,
    pub distribution: crate::distribution::DistributionOptions,
    pub tile_size_limit_kb: Option<f64>,
    /// Zoom level whose size distribution is reported.
    pub zoom: Option<u8>,
    /// Bucket of `zoom` whose tiles are listed.
    pub bucket: Option<usize>,
}
