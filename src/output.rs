use anyhow::Result;
use nu_ansi_term::Color;
use serde_json::json;

use crate::distribution::{LevelDistribution, SizeBucket, TileSize};
use crate::mbtiles::{InspectReport, SimplifyReport, SlimOutcome, TileDetail};

pub fn ndjson_lines(report: &InspectReport) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    lines.push(serde_json::to_string(&json!({
        "type": "summary",
        "schema": report.schema,
        "layers": report.layer_names,
        "overall": report.overall,
        "by_zoom": report.by_zoom,
    }))?);

    lines.push(serde_json::to_string(&json!({
        "type": "oversized",
        "limit_kb": report.tile_size_limit_kb,
        "by_zoom": report.oversized,
    }))?);

    if let Some(distribution) = report.distribution.as_ref() {
        lines.push(serde_json::to_string(&json!({
            "type": "distribution",
            "zoom": distribution.zoom,
            "buckets": distribution.buckets,
        }))?);
    }

    if let Some(tiles) = report.bucket_tiles.as_ref() {
        for tile in tiles.iter() {
            lines.push(serde_json::to_string(&json!({
                "type": "bucket_tile",
                "tile": tile,
            }))?);
        }
    }

    Ok(lines)
}

pub fn inspect_text_lines(report: &InspectReport, color: bool) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "tiles: {} total_bytes: {} max_bytes: {} avg_bytes: {}",
        report.overall.tile_count,
        report.overall.total_bytes,
        report.overall.max_bytes,
        report.overall.avg_bytes
    ));
    if !report.layer_names.is_empty() {
        lines.push(format!("layers: {}", report.layer_names.join(",")));
    }
    for zoom in report.by_zoom.iter() {
        lines.push(format!(
            "z={}: tiles={} total_bytes={} max_bytes={} avg_bytes={}",
            zoom.zoom,
            zoom.stats.tile_count,
            zoom.stats.total_bytes,
            zoom.stats.max_bytes,
            zoom.stats.avg_bytes
        ));
    }
    if report.oversized.is_empty() {
        lines.push(format!(
            "no tiles larger than {} KB",
            report.tile_size_limit_kb
        ));
    } else {
        lines.push(format!("tiles larger than {} KB:", report.tile_size_limit_kb));
        for item in report.oversized.iter() {
            let line = format!("z={}: count={}", item.zoom, item.count);
            lines.push(paint(color, Some(Color::Red), line));
        }
    }
    if let Some(distribution) = report.distribution.as_ref() {
        lines.extend(distribution_lines(distribution, color));
    }
    if let Some(tiles) = report.bucket_tiles.as_ref() {
        lines.extend(bucket_tile_lines(tiles, report.tile_size_limit_kb, color));
    }
    lines
}

pub fn distribution_lines(distribution: &LevelDistribution, color: bool) -> Vec<String> {
    let mut lines = vec![format!(
        "distribution z={}: tiles={} min_kb={:.2} max_kb={:.2}",
        distribution.zoom, distribution.tile_count, distribution.min_size, distribution.max_size
    )];
    for (idx, bucket) in distribution.buckets.iter().enumerate() {
        let line = format!(
            "{}: {:.2}-{:.2} KB count={} running_avg={:.2} pct_tiles={:.4} pct_size={:.4} accum_pct_tiles={:.4} accum_pct_size={:.4}",
            idx,
            bucket.min_size,
            bucket.max_size,
            bucket.tile_count,
            bucket.running_average_size,
            bucket.percent_of_tiles,
            bucket.percent_of_bytes,
            bucket.cumulative_percent_of_tiles,
            bucket.cumulative_percent_of_bytes,
        );
        lines.push(paint(color, bucket_color(bucket), line));
    }
    lines
}

fn bucket_color(bucket: &SizeBucket) -> Option<Color> {
    if bucket.avg_over_limit {
        Some(Color::Red)
    } else if bucket.avg_near_limit {
        Some(Color::Yellow)
    } else {
        None
    }
}

pub fn bucket_tile_lines(tiles: &[TileSize], limit_kb: f64, color: bool) -> Vec<String> {
    let mut lines = vec!["bucket_tiles:".to_string()];
    for tile in tiles.iter() {
        let line = format!(
            "z={}: column={} row={} size_kb={:.2}",
            tile.key.zoom, tile.key.column, tile.key.row, tile.size_kb
        );
        let tint = (tile.size_kb > limit_kb).then_some(Color::Red);
        lines.push(paint(color, tint, line));
    }
    lines
}

pub fn tile_detail_lines(detail: &TileDetail) -> Vec<String> {
    let summary = &detail.summary;
    let mut lines = vec![format!(
        "tile_summary: z={} column={} row={} bytes={} layers={} total_features={} vertices={}",
        summary.key.zoom,
        summary.key.column,
        summary.key.row,
        summary.tile_bytes,
        summary.layer_count,
        summary.total_features,
        summary.vertex_count
    )];
    for layer in summary.layers.iter() {
        lines.push(format!(
            "layer: {} features={} vertices={} property_keys={} property_values={}",
            layer.name,
            layer.feature_count,
            layer.vertex_count,
            layer.property_key_count,
            layer.property_value_count
        ));
    }
    lines
}

pub fn slim_text_lines(outcome: &SlimOutcome) -> Vec<String> {
    let report = &outcome.report;
    let mut lines = vec![format!(
        "slim: output={} processed={} updated={} deleted={} unchanged={}",
        outcome.output.display(),
        report.tiles_processed,
        report.tiles_updated,
        report.tiles_deleted,
        report.tiles_unchanged
    )];
    for (zoom, count) in report.prune.removed_features_by_zoom.iter() {
        lines.push(format!("z={zoom}: removed_features={count}"));
    }
    for (layer, zooms) in report.prune.removed_layers_by_zoom.iter() {
        let zooms = zooms
            .iter()
            .map(|zoom| zoom.to_string())
            .collect::<Vec<_>>()
            .join(",");
        lines.push(format!("layer {layer}: removed at z={zooms}"));
    }
    lines
}

pub fn simplify_text_lines(report: &SimplifyReport) -> Vec<String> {
    vec![format!(
        "simplify: tile={} layer={} features={} vertices_before={} vertices_after={} reduction={:.2}%",
        report.key,
        report.layer,
        report.feature_count,
        report.vertices_before,
        report.vertices_after,
        report.reduction_pct()
    )]
}

fn paint(enabled: bool, color: Option<Color>, text: String) -> String {
    match color {
        Some(color) if enabled => color.paint(text).to_string(),
        _ => text,
    }
}
