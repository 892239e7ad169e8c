use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::error::{Error, Result};
use crate::mbtiles::types::{SchemaVariant, TileKey};

impl SchemaVariant {
    /// Relation exposing `zoom_level, tile_column, tile_row, tile_data` for reads.
    pub(crate) fn relation(self) -> &'static str {
        match self {
            SchemaVariant::Tiles => "tiles",
            SchemaVariant::MapImages => "map JOIN images ON images.tile_id = map.tile_id",
        }
    }

    /// Store new bytes for one address.
    ///
    /// For map/images an image referenced by other addresses is left as is:
    /// the new bytes go into a fresh `images` row and only this address is
    /// pointed at it.
    pub(crate) fn update_tile(self, tx: &Transaction<'_>, key: TileKey, data: &[u8]) -> Result<usize> {
        match self {
            SchemaVariant::Tiles => {
                let sql = "UPDATE tiles SET tile_data = ?1 WHERE zoom_level = ?2 AND tile_column = ?3 AND tile_row = ?4";
                tx.execute(sql, params![data, key.zoom, key.column, key.row])
                    .map_err(Error::query(sql))
            }
            SchemaVariant::MapImages => {
                let Some(tile_id) = map_tile_id(tx, key)? else {
                    return Ok(0);
                };
                let count = "SELECT COUNT(*) FROM map WHERE tile_id = ?1";
                let references: i64 = tx
                    .query_row(count, params![tile_id], |row| row.get(0))
                    .map_err(Error::query(count))?;
                if references <= 1 {
                    let sql = "UPDATE images SET tile_data = ?1 WHERE tile_id = ?2";
                    tx.execute(sql, params![data, tile_id])
                        .map_err(Error::query(sql))?;
                    return Ok(1);
                }

                let fresh_id = unused_image_id(tx, key)?;
                let insert = "INSERT INTO images (tile_data, tile_id) VALUES (?1, ?2)";
                tx.execute(insert, params![data, fresh_id])
                    .map_err(Error::query(insert))?;
                let repoint = "UPDATE map SET tile_id = ?1 WHERE zoom_level = ?2 AND tile_column = ?3 AND tile_row = ?4";
                tx.execute(repoint, params![fresh_id, key.zoom, key.column, key.row])
                    .map_err(Error::query(repoint))
            }
        }
    }

    /// Returns the number of tile addresses removed.
    pub(crate) fn delete_tile(self, tx: &Transaction<'_>, key: TileKey) -> Result<usize> {
        match self {
            SchemaVariant::Tiles => {
                let sql = "DELETE FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3";
                tx.execute(sql, params![key.zoom, key.column, key.row])
                    .map_err(Error::query(sql))
            }
            SchemaVariant::MapImages => {
                let Some(tile_id) = map_tile_id(tx, key)? else {
                    return Ok(0);
                };
                let delete_map = "DELETE FROM map WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3";
                let removed = tx
                    .execute(delete_map, params![key.zoom, key.column, key.row])
                    .map_err(Error::query(delete_map))?;
                // Images shared with other addresses stay.
                let delete_image = "DELETE FROM images WHERE tile_id = ?1 AND NOT EXISTS (SELECT 1 FROM map WHERE tile_id = ?1)";
                tx.execute(delete_image, params![tile_id])
                    .map_err(Error::query(delete_image))?;
                Ok(removed)
            }
        }
    }
}

fn map_tile_id(tx: &Transaction<'_>, key: TileKey) -> Result<Option<Value>> {
    let sql = "SELECT tile_id FROM map WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3";
    tx.query_row(sql, params![key.zoom, key.column, key.row], |row| row.get(0))
        .optional()
        .map_err(Error::query(sql))
}

/// An `images` id derived from the address that no row uses yet.
fn unused_image_id(tx: &Transaction<'_>, key: TileKey) -> Result<String> {
    let sql = "SELECT EXISTS (SELECT 1 FROM images WHERE tile_id = ?1)";
    let base = format!("{}-{}-{}", key.zoom, key.column, key.row);
    let mut candidate = base.clone();
    let mut suffix = 1u32;
    loop {
        let taken: bool = tx
            .query_row(sql, params![candidate], |row| row.get(0))
            .map_err(Error::query(sql))?;
        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
}

/// Pick the layout from the tables and views present.
pub(crate) fn detect_schema(conn: &Connection) -> rusqlite::Result<Option<SchemaVariant>> {
    let has_map = has_relation(conn, "map")?;
    let has_images = has_relation(conn, "images")?;
    if has_map && has_images {
        return Ok(Some(SchemaVariant::MapImages));
    }
    if has_relation(conn, "tiles")? {
        return Ok(Some(SchemaVariant::Tiles));
    }
    Ok(None)
}

pub(crate) fn has_relation(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}
