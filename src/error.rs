use std::path::PathBuf;

use thiserror::Error;

use crate::mbtiles::TileKey;

/// Errors raised by the tile store, codec and style engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The container could not be opened, is not writable, or is not a tile store.
    #[error("failed to open tile store {}: {reason}", .path.display())]
    StoreOpen { path: PathBuf, reason: String },

    /// A mutation was requested on a store opened for reading.
    #[error("tile store {} was opened read-only", .0.display())]
    ReadOnlyStore(PathBuf),

    /// A statement failed to prepare or run.
    #[error("query failed ({sql}): {source}")]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A tile blob failed to decompress or parse, or a structured tile failed to encode.
    #[error("corrupt tile{}: {reason}", describe_tile(.tile))]
    CorruptTile {
        tile: Option<TileKey>,
        reason: String,
    },

    /// A GeoJSON geometry has no vector tile representation.
    #[error("unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    /// The style document is missing, unreadable, or has no usable layers.
    #[error("failed to load style {origin}: {reason}")]
    StyleLoad { origin: String, reason: String },

    /// The simplification collaborator rejected its input.
    #[error("simplification failed: {0}")]
    Simplification(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The remote tile collaborator failed.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn query(sql: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Error {
        let sql = sql.into();
        move |source| Error::Query { sql, source }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Error {
        Error::CorruptTile {
            tile: None,
            reason: reason.into(),
        }
    }

    /// Attach the tile key to a codec error raised without one.
    pub fn for_tile(self, key: TileKey) -> Error {
        match self {
            Error::CorruptTile { tile: None, reason } => Error::CorruptTile {
                tile: Some(key),
                reason,
            },
            other => other,
        }
    }
}

fn describe_tile(tile: &Option<TileKey>) -> String {
    match tile {
        Some(key) => format!(" {key}"),
        None => String::new(),
    }
}
