use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Transaction, params};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::distribution::TileSize;
use crate::error::{Error, Result};
use crate::mbtiles::schema::{detect_schema, has_relation};
use crate::mbtiles::stats::{OversizedCount, TileSizeStats, ZoomLevelSummary, finalize_stats};
use crate::mbtiles::types::{AccessMode, SchemaVariant, StoreOptions, TileKey};
use crate::tile::{StructuredTile, decode_tile, encode_tile};

/// An open MBTiles container.
///
/// Metadata and the layer list are read once at open. After
/// [`TileStore::load_all_tiles`] every read is served from memory and batch
/// writes keep that copy in step with the file.
pub struct TileStore {
    conn: Connection,
    path: PathBuf,
    access: AccessMode,
    schema: SchemaVariant,
    vacuum_after_write: bool,
    metadata: BTreeMap<String, String>,
    layer_names: Vec<String>,
    cache: Option<HashMap<TileKey, Vec<u8>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Updated,
    Deleted,
}

impl TileStore {
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        let open_err = |reason: String| Error::StoreOpen {
            path: path.to_path_buf(),
            reason,
        };
        if !path.is_file() {
            return Err(open_err("no such file".to_string()));
        }
        let flags = match options.access {
            AccessMode::Read => OpenFlags::SQLITE_OPEN_READ_ONLY,
            AccessMode::Write => {
                let readonly = fs::metadata(path)
                    .map_err(|err| open_err(err.to_string()))?
                    .permissions()
                    .readonly();
                if readonly {
                    return Err(open_err("file is not writable".to_string()));
                }
                OpenFlags::SQLITE_OPEN_READ_WRITE
            }
        };
        let conn = Connection::open_with_flags(path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .map_err(|err| open_err(err.to_string()))?;

        let detected = detect_schema(&conn).map_err(|err| open_err(err.to_string()))?;
        let schema = match (options.schema, detected) {
            (Some(schema), _) | (None, Some(schema)) => schema,
            (None, None) => {
                return Err(open_err(
                    "neither a tiles table nor map/images tables".to_string(),
                ));
            }
        };
        if !has_relation(&conn, "metadata").map_err(|err| open_err(err.to_string()))? {
            return Err(open_err("missing metadata table".to_string()));
        }
        if options.access == AccessMode::Read {
            apply_read_pragmas(&conn)?;
        }

        let metadata = read_metadata(&conn)?;
        let layer_names = parse_layer_names(&metadata);
        info!(
            path = %path.display(),
            schema = ?schema,
            metadata_entries = metadata.len(),
            layers = layer_names.len(),
            "opened tile store"
        );

        let mut store = Self {
            conn,
            path: path.to_path_buf(),
            access: options.access,
            schema,
            vacuum_after_write: options.vacuum_after_write,
            metadata,
            layer_names,
            cache: None,
        };
        if options.load_in_memory {
            store.load_all_tiles()?;
        }
        Ok(store)
    }

    /// Release the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, source)| Error::Query {
                sql: "close".to_string(),
                source,
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> SchemaVariant {
        self.schema
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Layer ids from the `vector_layers` entry of the `json` metadata, sorted.
    pub fn layer_names(&self) -> &[String] {
        &self.layer_names
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.is_some()
    }

    /// Every stored address, ascending by zoom level.
    pub fn list_tile_keys(&self) -> Result<Vec<TileKey>> {
        if let Some(cache) = self.cache.as_ref() {
            let mut keys = cache.keys().copied().collect::<Vec<_>>();
            keys.sort();
            return Ok(keys);
        }
        let sql = format!(
            "SELECT zoom_level, tile_column, tile_row FROM {} ORDER BY zoom_level, tile_column, tile_row",
            self.schema.relation()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(Error::query(&sql))?;
        let rows = stmt
            .query_map([], key_from_row)
            .map_err(Error::query(&sql))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::query(&sql))
    }

    /// Read every blob into memory; later reads no longer touch the file.
    pub fn load_all_tiles(&mut self) -> Result<usize> {
        let sql = format!(
            "SELECT zoom_level, tile_column, tile_row, tile_data FROM {}",
            self.schema.relation()
        );
        let mut cache = HashMap::new();
        {
            let mut stmt = self.conn.prepare(&sql).map_err(Error::query(&sql))?;
            let mut rows = stmt.query([]).map_err(Error::query(&sql))?;
            while let Some(row) = rows.next().map_err(Error::query(&sql))? {
                let key = key_from_row(row).map_err(Error::query(&sql))?;
                let data: Vec<u8> = row.get(3).map_err(Error::query(&sql))?;
                cache.insert(key, data);
            }
        }
        let count = cache.len();
        debug!(tiles = count, "loaded tile store into memory");
        self.cache = Some(cache);
        Ok(count)
    }

    pub fn read_tile(&self, key: TileKey) -> Result<Vec<u8>> {
        if let Some(cache) = self.cache.as_ref() {
            return cache
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("tile {key}")));
        }
        read_tile_from(&self.conn, self.schema, key)
    }

    pub fn read_structured_tile(&self, key: TileKey) -> Result<StructuredTile> {
        let data = self.read_tile(key)?;
        decode_tile(&data).map_err(|err| err.for_tile(key))
    }

    /// Stored byte length of one tile.
    pub fn tile_size(&self, key: TileKey) -> Result<u64> {
        if let Some(cache) = self.cache.as_ref() {
            return cache
                .get(&key)
                .map(|data| data.len() as u64)
                .ok_or_else(|| Error::NotFound(format!("tile {key}")));
        }
        let sql = format!(
            "SELECT LENGTH(tile_data) FROM {} WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
            self.schema.relation()
        );
        let size: Option<i64> = self
            .conn
            .query_row(&sql, params![key.zoom, key.column, key.row], |row| row.get(0))
            .optional()
            .map_err(Error::query(&sql))?;
        size.map(|size| size.max(0) as u64)
            .ok_or_else(|| Error::NotFound(format!("tile {key}")))
    }

    /// Count and byte totals per zoom level, aggregated by SQLite.
    pub fn zoom_level_summaries(&self) -> Result<Vec<ZoomLevelSummary>> {
        let sql = format!(
            "SELECT zoom_level, COUNT(*), SUM(LENGTH(tile_data)), MAX(LENGTH(tile_data)) FROM {} GROUP BY zoom_level ORDER BY zoom_level",
            self.schema.relation()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(Error::query(&sql))?;
        let rows = stmt
            .query_map([], |row| {
                let zoom: u8 = row.get(0)?;
                let count: i64 = row.get(1)?;
                let total: Option<i64> = row.get(2)?;
                let max: Option<i64> = row.get(3)?;
                let mut stats = TileSizeStats {
                    tile_count: count.max(0) as u64,
                    total_bytes: total.unwrap_or(0).max(0) as u64,
                    max_bytes: max.unwrap_or(0).max(0) as u64,
                    avg_bytes: 0,
                };
                finalize_stats(&mut stats);
                Ok(ZoomLevelSummary { zoom, stats })
            })
            .map_err(Error::query(&sql))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::query(&sql))
    }

    /// Per-level count of tiles larger than `threshold_kb` kilobytes; levels without any are omitted.
    pub fn oversized_tile_counts(&self, threshold_kb: f64) -> Result<Vec<OversizedCount>> {
        let sql = format!(
            "SELECT zoom_level, COUNT(*) FROM {} WHERE LENGTH(tile_data) > ?1 GROUP BY zoom_level ORDER BY zoom_level",
            self.schema.relation()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(Error::query(&sql))?;
        let rows = stmt
            .query_map([threshold_kb * 1024.0], |row| {
                let zoom: u8 = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok(OversizedCount {
                    zoom,
                    count: count.max(0) as u64,
                })
            })
            .map_err(Error::query(&sql))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::query(&sql))
    }

    /// Every tile of one level with its size in kilobytes.
    pub fn level_tile_sizes(&self, zoom: u8) -> Result<Vec<TileSize>> {
        let sql = format!(
            "SELECT zoom_level, tile_column, tile_row, LENGTH(tile_data) FROM {} WHERE zoom_level = ?1",
            self.schema.relation()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(Error::query(&sql))?;
        let rows = stmt
            .query_map([zoom], |row| {
                let key = key_from_row(row)?;
                let bytes: i64 = row.get(3)?;
                Ok(TileSize {
                    key,
                    size_kb: bytes as f64 / 1024.0,
                })
            })
            .map_err(Error::query(&sql))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::query(&sql))
    }

    pub fn upsert_metadata(&mut self, name: &str, value: &str) -> Result<()> {
        self.with_batch(|batch| batch.upsert_metadata(name, value))
    }

    pub fn vacuum(&self) -> Result<()> {
        self.ensure_writable()?;
        self.conn
            .execute_batch("VACUUM")
            .map_err(Error::query("VACUUM"))?;
        debug!(path = %self.path.display(), "vacuumed tile store");
        Ok(())
    }

    /// Run `f` inside one transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise,
    /// leaving the previously committed state untouched. After a commit the
    /// file is vacuumed unless the store was opened with
    /// `vacuum_after_write = false`.
    pub fn with_batch<T>(&mut self, f: impl FnOnce(&mut TileBatch<'_>) -> Result<T>) -> Result<T> {
        self.ensure_writable()?;
        let (value, changes) = {
            let tx = self
                .conn
                .transaction()
                .map_err(Error::query("BEGIN"))?;
            let mut batch = TileBatch {
                tx,
                schema: self.schema,
                cache: self.cache.as_ref(),
                changes: BatchChanges::default(),
            };
            match f(&mut batch) {
                Ok(value) => (value, batch.commit()?),
                Err(err) => {
                    batch.rollback();
                    warn!(error = %err, "aborted tile batch");
                    return Err(err);
                }
            }
        };

        if let Some(cache) = self.cache.as_mut() {
            for (key, data) in changes.tiles {
                match data {
                    Some(data) => {
                        cache.insert(key, data);
                    }
                    None => {
                        cache.remove(&key);
                    }
                }
            }
        }
        for (name, value) in changes.metadata {
            self.metadata.insert(name, value);
        }
        self.layer_names = parse_layer_names(&self.metadata);
        if self.vacuum_after_write {
            self.vacuum()?;
        }
        Ok(value)
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.access {
            AccessMode::Write => Ok(()),
            AccessMode::Read => Err(Error::ReadOnlyStore(self.path.clone())),
        }
    }
}

/// Mutations of one open transaction, see [`TileStore::with_batch`].
pub struct TileBatch<'a> {
    tx: Transaction<'a>,
    schema: SchemaVariant,
    cache: Option<&'a HashMap<TileKey, Vec<u8>>>,
    changes: BatchChanges,
}

/// Writes of a batch, applied to the in-memory copy once committed.
#[derive(Default)]
struct BatchChanges {
    tiles: HashMap<TileKey, Option<Vec<u8>>>,
    metadata: Vec<(String, String)>,
    updated: u64,
    deleted: u64,
}

impl TileBatch<'_> {
    fn commit(self) -> Result<BatchChanges> {
        self.tx.commit().map_err(Error::query("COMMIT"))?;
        info!(
            updated = self.changes.updated,
            deleted = self.changes.deleted,
            "committed tile batch"
        );
        Ok(self.changes)
    }

    fn rollback(self) {
        if let Err(err) = self.tx.rollback() {
            warn!(error = %err, "rollback failed");
        }
    }

    /// Read a tile as this transaction sees it.
    pub fn read_tile(&self, key: TileKey) -> Result<Vec<u8>> {
        if let Some(pending) = self.changes.tiles.get(&key) {
            return pending
                .clone()
                .ok_or_else(|| Error::NotFound(format!("tile {key}")));
        }
        if let Some(cache) = self.cache {
            return cache
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("tile {key}")));
        }
        read_tile_from(&self.tx, self.schema, key)
    }

    pub fn read_structured_tile(&self, key: TileKey) -> Result<StructuredTile> {
        let data = self.read_tile(key)?;
        decode_tile(&data).map_err(|err| err.for_tile(key))
    }

    /// Delete the tile when it has no layers left, otherwise encode and store it.
    pub fn write_or_delete_tile(&mut self, key: TileKey, tile: &StructuredTile) -> Result<WriteOutcome> {
        if tile.is_empty() {
            self.delete_tile(key)?;
            return Ok(WriteOutcome::Deleted);
        }
        let data = encode_tile(tile).map_err(|err| err.for_tile(key))?;
        self.update_tile(key, data)?;
        Ok(WriteOutcome::Updated)
    }

    pub fn update_tile(&mut self, key: TileKey, data: Vec<u8>) -> Result<()> {
        let changed = self.schema.update_tile(&self.tx, key, &data)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("tile {key}")));
        }
        self.changes.updated += 1;
        if self.cache.is_some() {
            self.changes.tiles.insert(key, Some(data));
        }
        Ok(())
    }

    pub fn delete_tile(&mut self, key: TileKey) -> Result<()> {
        let removed = self.schema.delete_tile(&self.tx, key)?;
        if removed == 0 {
            return Err(Error::NotFound(format!("tile {key}")));
        }
        self.changes.deleted += 1;
        if self.cache.is_some() {
            self.changes.tiles.insert(key, None);
        }
        Ok(())
    }

    /// Update the metadata entry in place, inserting it when absent.
    pub fn upsert_metadata(&mut self, name: &str, value: &str) -> Result<()> {
        let update = "UPDATE metadata SET value = ?2 WHERE name = ?1";
        let changed = self
            .tx
            .execute(update, params![name, value])
            .map_err(Error::query(update))?;
        if changed == 0 {
            let insert = "INSERT INTO metadata (name, value) VALUES (?1, ?2)";
            self.tx
                .execute(insert, params![name, value])
                .map_err(Error::query(insert))?;
        }
        self.changes
            .metadata
            .push((name.to_string(), value.to_string()));
        Ok(())
    }
}

fn key_from_row(row: &Row<'_>) -> rusqlite::Result<TileKey> {
    Ok(TileKey {
        zoom: row.get(0)?,
        column: row.get(1)?,
        row: row.get(2)?,
    })
}

fn read_tile_from(conn: &Connection, schema: SchemaVariant, key: TileKey) -> Result<Vec<u8>> {
    let sql = format!(
        "SELECT tile_data FROM {} WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
        schema.relation()
    );
    conn.query_row(&sql, params![key.zoom, key.column, key.row], |row| row.get(0))
        .optional()
        .map_err(Error::query(&sql))?
        .ok_or_else(|| Error::NotFound(format!("tile {key}")))
}

fn apply_read_pragmas(conn: &Connection) -> Result<()> {
    let sql = "
        PRAGMA query_only = ON;
        PRAGMA temp_store = MEMORY;
        PRAGMA cache_size = -200000;
        ";
    conn.execute_batch(sql).map_err(Error::query("read pragmas"))
}

fn read_metadata(conn: &Connection) -> Result<BTreeMap<String, String>> {
    let sql = "SELECT name, value FROM metadata";
    let mut stmt = conn.prepare(sql).map_err(Error::query(sql))?;
    let rows = stmt
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let value: Option<String> = row.get(1)?;
            Ok((name, value.unwrap_or_default()))
        })
        .map_err(Error::query(sql))?;
    rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
        .map_err(Error::query(sql))
}

fn parse_layer_names(metadata: &BTreeMap<String, String>) -> Vec<String> {
    let Some(json) = metadata.get("json") else {
        return Vec::new();
    };
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "metadata json is not valid JSON; no layer list");
            return Vec::new();
        }
    };
    let mut names = value
        .get("vector_layers")
        .and_then(|layers| layers.as_array())
        .map(|layers| {
            layers
                .iter()
                .filter_map(|layer| layer.get("id").and_then(|id| id.as_str()))
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    names.sort();
    names
}
