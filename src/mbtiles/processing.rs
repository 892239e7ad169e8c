use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::distribution::{
    DistributionOptions, LevelDistribution, TileSize, compute_level_distribution,
};
use crate::error::{Error, Result};
use crate::fetch::TileFetcher;
use crate::mbtiles::stats::{
    InspectReport, PruneStats, SimplifyReport, SlimReport, TileSizeStats, TileSummary,
    finalize_stats,
};
use crate::mbtiles::store::{TileStore, WriteOutcome};
use crate::mbtiles::types::{
    DEFAULT_TILE_SIZE_LIMIT_KB, InspectOptions, SLIM_BOUNDS, SlimOptions, TileCoord, TileKey,
};
use crate::progress::SlimProgress;
use crate::simplify::Simplifier;
use crate::style::MapboxStyle;
use crate::tile::{
    LayerCollections, StructuredTile, count_positions, decode_tile, layer_from_geojson,
    layer_to_geojson, to_geojson,
};

/// Drop every layer the style does not draw at `zoom`. Returns whether anything was removed.
pub fn prune_tile_layers(
    tile: &mut StructuredTile,
    zoom: u8,
    style: &MapboxStyle,
    stats: &mut PruneStats,
) -> bool {
    let before = tile.layers.len();
    tile.layers.retain(|layer| {
        if style.is_layer_visible_on_level(&layer.name, zoom) {
            return true;
        }
        stats.record_removed_features(zoom, layer.features.len() as u64);
        stats.record_removed_layer(&layer.name, zoom);
        false
    });
    tile.layers.len() != before
}

/// Prune every tile of an open store in one transaction.
///
/// Tiles left without layers are deleted, pruned tiles are re-encoded and
/// untouched tiles are not rewritten. The metadata `bounds` entry is set to
/// the whole Mercator world.
pub fn slim_store(
    store: &mut TileStore,
    style: &MapboxStyle,
    options: &SlimOptions,
    progress: &mut dyn FnMut(&SlimProgress),
) -> Result<SlimReport> {
    let keys = store.list_tile_keys()?;
    let total = keys.len() as u64;
    let interval = options.progress_interval.max(1);
    let mut report = SlimReport::default();

    store.with_batch(|batch| {
        let mut last_zoom = None;
        for (idx, key) in keys.iter().enumerate() {
            let mut tile = batch.read_structured_tile(*key)?;
            if prune_tile_layers(&mut tile, key.zoom, style, &mut report.prune) {
                match batch.write_or_delete_tile(*key, &tile)? {
                    WriteOutcome::Updated => report.tiles_updated += 1,
                    WriteOutcome::Deleted => report.tiles_deleted += 1,
                }
            } else {
                report.tiles_unchanged += 1;
            }
            report.tiles_processed += 1;

            if last_zoom != Some(key.zoom) || idx as u64 % interval == 0 {
                progress(&SlimProgress {
                    zoom: key.zoom,
                    processed: idx as u64,
                    total,
                    removed_features: report.prune.removed_feature_total(),
                });
                last_zoom = Some(key.zoom);
            }
        }
        batch.upsert_metadata("bounds", SLIM_BOUNDS)
    })?;

    info!(
        processed = report.tiles_processed,
        updated = report.tiles_updated,
        deleted = report.tiles_deleted,
        removed_features = report.prune.removed_feature_total(),
        "slim finished"
    );
    Ok(report)
}

/// `<input stem>_out.mbtiles` next to the input.
pub fn default_slim_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_out.mbtiles"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlimOutcome {
    pub output: PathBuf,
    pub report: SlimReport,
}

/// Copy `input` to `output` and slim the copy; the copy is removed again on failure.
pub fn slim_mbtiles(
    input: &Path,
    output: Option<&Path>,
    style: &MapboxStyle,
    options: &SlimOptions,
    progress: &mut dyn FnMut(&SlimProgress),
) -> Result<SlimOutcome> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_slim_output(input));
    if !input.is_file() {
        return Err(Error::StoreOpen {
            path: input.to_path_buf(),
            reason: "no such file".to_string(),
        });
    }
    let resolved_input = fs::canonicalize(input)?;
    if resolve_output_path(&output)? == resolved_input {
        return Err(Error::StoreOpen {
            path: output,
            reason: "output must differ from the input".to_string(),
        });
    }

    fs::copy(input, &output)?;
    debug!(input = %input.display(), output = %output.display(), "copied input for slimming");
    match slim_copy(&output, style, options, progress) {
        Ok(report) => Ok(SlimOutcome { output, report }),
        Err(err) => {
            let aliases_input = fs::canonicalize(&output)
                .map(|resolved| resolved == resolved_input)
                .unwrap_or(false);
            if aliases_input {
                warn!(output = %output.display(), "output resolves to the input; not removing it");
            } else if let Err(remove_err) = fs::remove_file(&output) {
                warn!(output = %output.display(), error = %remove_err, "failed to remove partial output");
            }
            Err(err)
        }
    }
}

/// Absolute form of a path that may not exist yet: its parent is resolved
/// and the file name joined back on.
fn resolve_output_path(output: &Path) -> Result<PathBuf> {
    if output.exists() {
        return Ok(fs::canonicalize(output)?);
    }
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let resolved = fs::canonicalize(parent)?;
    Ok(match output.file_name() {
        Some(name) => resolved.join(name),
        None => resolved,
    })
}

fn slim_copy(
    output: &Path,
    style: &MapboxStyle,
    options: &SlimOptions,
    progress: &mut dyn FnMut(&SlimProgress),
) -> Result<SlimReport> {
    let mut store = TileStore::open(output, options.store.clone())?;
    let report = slim_store(&mut store, style, options, progress)?;
    store.close()?;
    Ok(report)
}

pub fn level_distribution(
    store: &TileStore,
    zoom: u8,
    options: &DistributionOptions,
) -> Result<LevelDistribution> {
    let sizes = store.level_tile_sizes(zoom)?;
    if sizes.is_empty() {
        return Err(Error::NotFound(format!("tiles at zoom level {zoom}")));
    }
    Ok(compute_level_distribution(zoom, sizes, options))
}

pub fn bucket_tiles(distribution: &LevelDistribution, bucket: usize) -> Result<Vec<TileSize>> {
    distribution
        .buckets
        .get(bucket)
        .map(|bucket| bucket.tiles.clone())
        .ok_or_else(|| {
            Error::NotFound(format!(
                "bucket {bucket} at zoom level {} ({} buckets)",
                distribution.zoom,
                distribution.buckets.len()
            ))
        })
}

pub fn inspect_mbtiles(path: &Path, options: &InspectOptions) -> Result<InspectReport> {
    let store = TileStore::open(path, options.store.clone())?;
    let by_zoom = store.zoom_level_summaries()?;
    let mut overall = TileSizeStats {
        tile_count: 0,
        total_bytes: 0,
        max_bytes: 0,
        avg_bytes: 0,
    };
    for summary in by_zoom.iter() {
        overall.tile_count += summary.stats.tile_count;
        overall.total_bytes += summary.stats.total_bytes;
        overall.max_bytes = overall.max_bytes.max(summary.stats.max_bytes);
    }
    finalize_stats(&mut overall);

    let tile_size_limit_kb = options
        .tile_size_limit_kb
        .unwrap_or(DEFAULT_TILE_SIZE_LIMIT_KB);
    let oversized = store.oversized_tile_counts(tile_size_limit_kb)?;
    let distribution = options
        .zoom
        .map(|zoom| level_distribution(&store, zoom, &options.distribution))
        .transpose()?;
    let bucket_tiles = match (options.bucket, distribution.as_ref()) {
        (Some(bucket), Some(distribution)) => Some(bucket_tiles(distribution, bucket)?),
        _ => None,
    };

    let report = InspectReport {
        schema: store.schema(),
        metadata: store.metadata().clone(),
        layer_names: store.layer_names().to_vec(),
        overall,
        by_zoom,
        tile_size_limit_kb,
        oversized,
        distribution,
        bucket_tiles,
    };
    store.close()?;
    Ok(report)
}

/// One decoded tile: its summary plus a GeoJSON view of every layer.
#[derive(Debug, Clone, Serialize)]
pub struct TileDetail {
    pub summary: TileSummary,
    pub layers: LayerCollections,
}

pub fn tile_detail(store: &TileStore, key: TileKey) -> Result<TileDetail> {
    let data = store.read_tile(key)?;
    let tile = decode_tile(&data).map_err(|err| err.for_tile(key))?;
    Ok(TileDetail {
        summary: TileSummary::from_tile(key, data.len() as u64, &tile),
        layers: to_geojson(&tile, key.to_coord()),
    })
}

/// Simplify one layer of one tile and write the tile back.
///
/// Only the named layer is re-quantized; the other layers are re-encoded as decoded.
pub fn simplify_tile_layer(
    store: &mut TileStore,
    key: TileKey,
    layer_name: &str,
    tolerance: f64,
    simplifier: &dyn Simplifier,
) -> Result<SimplifyReport> {
    let mut tile = store.read_structured_tile(key)?;
    let layer = tile
        .layer(layer_name)
        .ok_or_else(|| Error::NotFound(format!("layer {layer_name} in tile {key}")))?;
    let coord = key.to_coord();
    let collection = layer_to_geojson(layer, coord);
    let vertices_before = count_positions(&collection);
    let simplified = simplifier.simplify(&collection, tolerance)?;
    let vertices_after = count_positions(&simplified);
    let replacement = layer_from_geojson(layer_name, &simplified, coord, layer.extent)?;
    let feature_count = replacement.features.len();
    tile.replace_layer(replacement);

    store.with_batch(|batch| batch.write_or_delete_tile(key, &tile))?;
    let report = SimplifyReport {
        key,
        layer: layer_name.to_string(),
        feature_count,
        vertices_before,
        vertices_after,
    };
    info!(
        tile = %key,
        layer = layer_name,
        vertices_before,
        vertices_after,
        "simplified layer"
    );
    Ok(report)
}

/// Download a tile and decode it at the given XYZ address.
pub fn fetch_and_inspect(
    fetcher: &dyn TileFetcher,
    url: &str,
    coord: TileCoord,
) -> Result<TileDetail> {
    let data = fetcher.fetch(url)?;
    let key = coord.to_key();
    let tile = decode_tile(&data).map_err(|err| err.for_tile(key))?;
    Ok(TileDetail {
        summary: TileSummary::from_tile(key, data.len() as u64, &tile),
        layers: to_geojson(&tile, coord),
    })
}

