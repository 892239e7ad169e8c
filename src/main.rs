use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use vt_slim::cli::{Cli, Command, ReportFormat};
use vt_slim::distribution::DistributionOptions;
use vt_slim::fetch::HttpTileFetcher;
use vt_slim::mbtiles::{
    InspectOptions, SlimOptions, StoreOptions, TileKey, TileStore, fetch_and_inspect,
    inspect_mbtiles, parse_tile_spec, simplify_tile_layer, slim_mbtiles, tile_detail,
};
use vt_slim::output::{
    inspect_text_lines, ndjson_lines, simplify_text_lines, slim_text_lines, tile_detail_lines,
};
use vt_slim::progress::{SlimProgress, progress_for_phase};
use vt_slim::simplify::GeoSimplifier;
use vt_slim::style::read_style;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);
    let schema = cli.schema.variant();

    match cli.command {
        Command::Inspect(args) => {
            if args.bucket.is_some() && args.zoom.is_none() {
                anyhow::bail!("--bucket requires --zoom");
            }
            if args.buckets == 0 {
                anyhow::bail!("--buckets must be greater than zero");
            }
            let options = InspectOptions {
                store: StoreOptions {
                    schema,
                    ..StoreOptions::read()
                },
                distribution: DistributionOptions {
                    bucket_count: args.buckets,
                    ..DistributionOptions::default()
                },
                tile_size_limit_kb: args.tile_size_limit_kb,
                zoom: args.zoom,
                bucket: args.bucket,
            };
            let report = inspect_mbtiles(&args.input, &options)?;
            match args.output {
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                ReportFormat::Ndjson => {
                    for line in ndjson_lines(&report)? {
                        println!("{}", line);
                    }
                }
                ReportFormat::Text => {
                    for line in inspect_text_lines(&report, !args.no_color) {
                        println!("{}", line);
                    }
                }
            }
        }
        Command::Tile(args) => {
            let store = TileStore::open(
                &args.input,
                StoreOptions {
                    schema,
                    ..StoreOptions::read()
                },
            )?;
            let detail = tile_detail(&store, TileKey::new(args.zoom, args.column, args.row))?;
            store.close()?;
            match args.output {
                ReportFormat::Text => {
                    for line in tile_detail_lines(&detail) {
                        println!("{}", line);
                    }
                }
                ReportFormat::Json | ReportFormat::Ndjson => {
                    println!("{}", serde_json::to_string(&detail.layers)?)
                }
            }
        }
        Command::Slim(args) => {
            let style = read_style(&args.style)?;
            let mut options = SlimOptions::default();
            options.store.schema = schema;
            let mut tracker = progress_for_phase("slimming tiles", 0, args.no_progress);
            let outcome = slim_mbtiles(
                &args.input,
                args.output.as_deref(),
                &style,
                &options,
                &mut |progress: &SlimProgress| {
                    if let Some(tracker) = tracker.as_mut() {
                        tracker.update(progress);
                    }
                },
            )?;
            if let Some(tracker) = tracker {
                tracker.finish();
            }
            for line in slim_text_lines(&outcome) {
                println!("{}", line);
            }
        }
        Command::Simplify(args) => {
            let mut store = TileStore::open(
                &args.input,
                StoreOptions {
                    schema,
                    ..StoreOptions::write()
                },
            )?;
            let report = simplify_tile_layer(
                &mut store,
                TileKey::new(args.zoom, args.column, args.row),
                &args.layer,
                args.tolerance,
                &GeoSimplifier,
            )?;
            store.close()?;
            for line in simplify_text_lines(&report) {
                println!("{}", line);
            }
        }
        Command::Fetch(args) => {
            let coord = parse_tile_spec(&args.tile)?;
            let fetcher = HttpTileFetcher::with_timeout(Duration::from_secs(args.timeout_secs))?;
            let detail = fetch_and_inspect(&fetcher, &args.url, coord)?;
            println!("{}", serde_json::to_string(&detail.layers)?);
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
