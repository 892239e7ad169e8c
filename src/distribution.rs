//! Size distribution of the tiles of one zoom level.

use serde::Serialize;

use crate::mbtiles::TileKey;

/// One tile of a level with its stored size in kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TileSize {
    pub key: TileKey,
    pub size_kb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionOptions {
    pub bucket_count: usize,
    /// Running averages above this many kilobytes are flagged as over the limit.
    pub avg_size_limit_kb: f64,
    /// Running averages above this many kilobytes are flagged as near the limit.
    pub avg_size_warning_kb: f64,
}

impl Default for DistributionOptions {
    fn default() -> Self {
        Self {
            bucket_count: 10,
            avg_size_limit_kb: 50.0,
            avg_size_warning_kb: 45.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeBucket {
    pub min_size: f64,
    pub max_size: f64,
    pub tile_count: usize,
    pub total_size: f64,
    /// Average size of every tile of the level processed up to this bucket.
    pub running_average_size: f64,
    pub percent_of_tiles: f64,
    pub percent_of_bytes: f64,
    pub cumulative_percent_of_tiles: f64,
    pub cumulative_percent_of_bytes: f64,
    pub avg_near_limit: bool,
    pub avg_over_limit: bool,
    #[serde(skip)]
    pub tiles: Vec<TileSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelDistribution {
    pub zoom: u8,
    pub tile_count: usize,
    pub total_size: f64,
    pub min_size: f64,
    pub max_size: f64,
    pub buckets: Vec<SizeBucket>,
}

/// Partition a level into equal-width size buckets.
///
/// Sizes are walked in ascending order. A tile larger than the current upper
/// bound closes the bucket and moves the bound up by exactly one width, so a
/// sparse level yields fewer buckets than `bucket_count` and the last bucket
/// can hold tiles above its nominal `max_size`.
pub fn compute_level_distribution(
    zoom: u8,
    mut sizes: Vec<TileSize>,
    options: &DistributionOptions,
) -> LevelDistribution {
    sizes.sort_by(|a, b| a.size_kb.total_cmp(&b.size_kb));
    let (Some(first), Some(last)) = (sizes.first(), sizes.last()) else {
        return LevelDistribution {
            zoom,
            tile_count: 0,
            total_size: 0.0,
            min_size: 0.0,
            max_size: 0.0,
            buckets: Vec::new(),
        };
    };

    let min_size = first.size_kb;
    let max_size = last.size_kb;
    let total_size: f64 = sizes.iter().map(|tile| tile.size_kb).sum();
    let tile_count = sizes.len();
    let width = (max_size - min_size) / options.bucket_count.max(1) as f64;

    let mut acc = BucketAccumulator {
        total_count: tile_count,
        total_size,
        options,
        buckets: Vec::new(),
    };
    let mut bucket_min = min_size;
    let mut bucket_max = min_size + width;
    let mut processed_size = 0.0;
    let mut current = Vec::new();

    for (idx, tile) in sizes.iter().enumerate() {
        if tile.size_kb <= bucket_max {
            current.push(*tile);
        } else {
            let closed = std::mem::replace(&mut current, vec![*tile]);
            acc.close(bucket_min, bucket_max, closed, idx, processed_size);
            bucket_min = bucket_max;
            bucket_max += width;
        }
        processed_size += tile.size_kb;
    }
    acc.close(bucket_min, bucket_max, current, tile_count, processed_size);

    LevelDistribution {
        zoom,
        tile_count,
        total_size,
        min_size,
        max_size,
        buckets: acc.buckets,
    }
}

struct BucketAccumulator<'a> {
    total_count: usize,
    total_size: f64,
    options: &'a DistributionOptions,
    buckets: Vec<SizeBucket>,
}

impl BucketAccumulator<'_> {
    fn close(
        &mut self,
        min_size: f64,
        max_size: f64,
        tiles: Vec<TileSize>,
        processed_count: usize,
        processed_size: f64,
    ) {
        let bucket_size: f64 = tiles.iter().map(|tile| tile.size_kb).sum();
        let percent_of_tiles = percent(tiles.len() as f64, self.total_count as f64);
        let percent_of_bytes = percent(bucket_size, self.total_size);
        let running_average_size = if processed_count == 0 {
            0.0
        } else {
            processed_size / processed_count as f64
        };
        let (prev_tiles, prev_bytes) = self
            .buckets
            .last()
            .map(|bucket| {
                (
                    bucket.cumulative_percent_of_tiles,
                    bucket.cumulative_percent_of_bytes,
                )
            })
            .unwrap_or((0.0, 0.0));

        self.buckets.push(SizeBucket {
            min_size,
            max_size,
            tile_count: tiles.len(),
            total_size: bucket_size,
            running_average_size,
            percent_of_tiles,
            percent_of_bytes,
            cumulative_percent_of_tiles: prev_tiles + percent_of_tiles,
            cumulative_percent_of_bytes: prev_bytes + percent_of_bytes,
            avg_near_limit: running_average_size > self.options.avg_size_warning_kb
                && running_average_size <= self.options.avg_size_limit_kb,
            avg_over_limit: running_average_size > self.options.avg_size_limit_kb,
            tiles,
        });
    }
}

fn percent(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        part / total * 100.0
    }
}
