use vt_slim::distribution::{DistributionOptions, TileSize, compute_level_distribution};
use vt_slim::mbtiles::TileKey;

fn sizes(values: &[f64]) -> Vec<TileSize> {
    values
        .iter()
        .enumerate()
        .map(|(idx, size_kb)| TileSize {
            key: TileKey::new(5, idx as u32, 0),
            size_kb: *size_kb,
        })
        .collect()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn outlier_closes_first_bucket() {
    let dist = compute_level_distribution(5, sizes(&[10.0, 1.0, 1.0, 1.0]), &DistributionOptions::default());
    assert_eq!(dist.tile_count, 4);
    assert_close(dist.min_size, 1.0);
    assert_close(dist.max_size, 10.0);
    assert_close(dist.total_size, 13.0);
    assert_eq!(dist.buckets.len(), 2);

    let first = &dist.buckets[0];
    assert_eq!(first.tile_count, 3);
    assert_close(first.min_size, 1.0);
    assert_close(first.max_size, 1.9);
    assert_close(first.percent_of_tiles, 75.0);
    assert_close(first.running_average_size, 1.0);

    // The bound only grows by one width, so the outlier lands in a bucket whose nominal max it exceeds.
    let last = &dist.buckets[1];
    assert_eq!(last.tile_count, 1);
    assert_close(last.max_size, 2.8);
    assert_close(last.running_average_size, 13.0 / 4.0);
    assert_close(last.cumulative_percent_of_tiles, 100.0);
    assert_close(last.cumulative_percent_of_bytes, 100.0);
}

#[test]
fn equal_sizes_make_one_bucket() {
    let dist = compute_level_distribution(5, sizes(&[4.0, 4.0, 4.0]), &DistributionOptions::default());
    assert_eq!(dist.buckets.len(), 1);
    assert_eq!(dist.buckets[0].tile_count, 3);
    assert_close(dist.buckets[0].percent_of_bytes, 100.0);
    assert_eq!(dist.buckets[0].tiles.len(), 3);
}

#[test]
fn empty_level_has_no_buckets() {
    let dist = compute_level_distribution(5, Vec::new(), &DistributionOptions::default());
    assert_eq!(dist.tile_count, 0);
    assert!(dist.buckets.is_empty());
}

#[test]
fn evenly_spread_sizes_fill_every_bucket() {
    let values = (0..=10).map(|v| v as f64 * 10.0).collect::<Vec<_>>();
    let dist = compute_level_distribution(5, sizes(&values), &DistributionOptions::default());
    assert_eq!(dist.buckets.len(), 10);
    assert_eq!(dist.buckets[0].tile_count, 2);
    assert!(dist.buckets[1..].iter().all(|bucket| bucket.tile_count == 1));
    let counted: usize = dist.buckets.iter().map(|bucket| bucket.tile_count).sum();
    assert_eq!(counted, 11);
    for pair in dist.buckets.windows(2) {
        assert!(pair[1].cumulative_percent_of_tiles >= pair[0].cumulative_percent_of_tiles);
    }
}

#[test]
fn running_average_flags_limits() {
    let options = DistributionOptions {
        bucket_count: 2,
        avg_size_limit_kb: 50.0,
        avg_size_warning_kb: 45.0,
    };
    let dist = compute_level_distribution(5, sizes(&[46.0, 48.0, 100.0]), &options);
    assert_eq!(dist.buckets.len(), 2);
    assert_close(dist.buckets[0].running_average_size, 47.0);
    assert!(dist.buckets[0].avg_near_limit);
    assert!(!dist.buckets[0].avg_over_limit);
    assert_close(dist.buckets[1].running_average_size, 194.0 / 3.0);
    assert!(dist.buckets[1].avg_over_limit);
    assert!(!dist.buckets[1].avg_near_limit);
}

#[test]
fn bucket_tiles_are_sorted_by_size() {
    let dist = compute_level_distribution(5, sizes(&[3.0, 1.0, 2.0]), &DistributionOptions {
        bucket_count: 1,
        ..DistributionOptions::default()
    });
    let tiles = &dist.buckets[0].tiles;
    let ordered = tiles.iter().map(|tile| tile.size_kb).collect::<Vec<_>>();
    assert_eq!(ordered, vec![1.0, 2.0, 3.0]);
    assert_eq!(tiles[0].key, TileKey::new(5, 1, 0));
}
