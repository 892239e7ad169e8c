//! Inspect, slim and simplify MBTiles vector tile stores.

pub mod cli;
pub mod coords;
pub mod distribution;
pub mod error;
pub mod fetch;
pub mod mbtiles;
pub mod output;
pub mod progress;
pub mod simplify;
pub mod style;
pub mod tile;

pub use error::{Error, Result};
