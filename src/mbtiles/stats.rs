use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::distribution::{LevelDistribution, TileSize};
use crate::mbtiles::types::{SchemaVariant, TileKey};
use crate::tile::StructuredTile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileSizeStats {
    pub tile_count: u64,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub avg_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoomLevelSummary {
    pub zoom: u8,
    pub stats: TileSizeStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OversizedCount {
    pub zoom: u8,
    pub count: u64,
}

pub fn finalize_stats(stats: &mut TileSizeStats) {
    if stats.tile_count == 0 {
        stats.avg_bytes = 0;
    } else {
        stats.avg_bytes = stats.total_bytes / stats.tile_count;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub extent: u32,
    pub feature_count: usize,
    pub vertex_count: u64,
    pub property_key_count: usize,
    pub property_value_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub property_keys: Vec<String>,
}

/// Detail of a single stored tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileSummary {
    pub key: TileKey,
    pub tile_bytes: u64,
    pub layer_count: usize,
    pub total_features: usize,
    pub vertex_count: u64,
    pub property_key_count: usize,
    pub property_value_count: usize,
    pub layers: Vec<LayerSummary>,
}

impl TileSummary {
    pub fn from_tile(key: TileKey, tile_bytes: u64, tile: &StructuredTile) -> Self {
        let layers = tile
            .layers
            .iter()
            .map(|layer| {
                let mut property_keys = layer.keys.clone();
                property_keys.sort();
                LayerSummary {
                    name: layer.name.clone(),
                    extent: layer.extent,
                    feature_count: layer.features.len(),
                    vertex_count: layer.vertex_count() as u64,
                    property_key_count: layer.keys.len(),
                    property_value_count: layer.values.len(),
                    property_keys,
                }
            })
            .collect::<Vec<_>>();
        Self {
            key,
            tile_bytes,
            layer_count: layers.len(),
            total_features: tile.feature_count(),
            vertex_count: tile.vertex_count() as u64,
            property_key_count: layers.iter().map(|layer| layer.property_key_count).sum(),
            property_value_count: layers.iter().map(|layer| layer.property_value_count).sum(),
            layers,
        }
    }
}

/// Removal bookkeeping of a pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub removed_features_by_zoom: BTreeMap<u8, u64>,
    pub removed_layers_by_zoom: BTreeMap<String, BTreeSet<u8>>,
}

impl PruneStats {
    pub fn record_removed_features(&mut self, zoom: u8, count: u64) {
        if count == 0 {
            return;
        }
        *self.removed_features_by_zoom.entry(zoom).or_insert(0) += count;
    }

    pub fn record_removed_layer(&mut self, layer: &str, zoom: u8) {
        self.removed_layers_by_zoom
            .entry(layer.to_string())
            .or_default()
            .insert(zoom);
    }

    pub fn removed_feature_total(&self) -> u64 {
        self.removed_features_by_zoom.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlimReport {
    pub tiles_processed: u64,
    pub tiles_updated: u64,
    pub tiles_deleted: u64,
    pub tiles_unchanged: u64,
    pub prune: PruneStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimplifyReport {
    pub key: TileKey,
    pub layer: String,
    pub feature_count: usize,
    pub vertices_before: usize,
    pub vertices_after: usize,
}

impl SimplifyReport {
    pub fn reduction_pct(&self) -> f64 {
        if self.vertices_before == 0 {
            return 0.0;
        }
        let removed = self.vertices_before.saturating_sub(self.vertices_after);
        removed as f64 / self.vertices_before as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectReport {
    pub schema: SchemaVariant,
    pub metadata: BTreeMap<String, String>,
    pub layer_names: Vec<String>,
    pub overall: TileSizeStats,
    pub by_zoom: Vec<ZoomLevelSummary>,
    pub tile_size_limit_kb: f64,
    pub oversized: Vec<OversizedCount>,
    pub distribution: Option<LevelDistribution>,
    pub bucket_tiles: Option<Vec<TileSize>>,
}
