use clap::{CommandFactory, Parser};

use vt_slim::cli::{Cli, Command, ReportFormat, SchemaArg};
use vt_slim::mbtiles::SchemaVariant;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parse_inspect_defaults() {
    let cli = Cli::parse_from(["vt-slim", "inspect", "tokyo.mbtiles"]);
    assert_eq!(cli.log, "info");
    assert_eq!(cli.schema, SchemaArg::Auto);
    match cli.command {
        Command::Inspect(args) => {
            assert_eq!(args.input.as_os_str(), "tokyo.mbtiles");
            assert_eq!(args.zoom, None);
            assert_eq!(args.bucket, None);
            assert_eq!(args.buckets, 10);
            assert_eq!(args.tile_size_limit_kb, None);
            assert_eq!(args.output, ReportFormat::Text);
            assert!(!args.no_color);
        }
        _ => panic!("expected inspect command"),
    }
}

#[test]
fn parse_inspect_options() {
    let cli = Cli::parse_from([
        "vt-slim",
        "inspect",
        "tokyo.mbtiles",
        "--zoom",
        "14",
        "--bucket",
        "3",
        "--buckets",
        "20",
        "--tile-size-limit-kb",
        "250",
        "--output",
        "ndjson",
        "--no-color",
        "--schema",
        "map-images",
        "--log",
        "debug",
    ]);
    assert_eq!(cli.log, "debug");
    assert_eq!(cli.schema.variant(), Some(SchemaVariant::MapImages));
    match cli.command {
        Command::Inspect(args) => {
            assert_eq!(args.zoom, Some(14));
            assert_eq!(args.bucket, Some(3));
            assert_eq!(args.buckets, 20);
            assert_eq!(args.tile_size_limit_kb, Some(250.0));
            assert_eq!(args.output, ReportFormat::Ndjson);
            assert!(args.no_color);
        }
        _ => panic!("expected inspect command"),
    }
}

#[test]
fn parse_tile_command() {
    let cli = Cli::parse_from([
        "vt-slim", "tile", "tokyo.mbtiles", "--zoom", "12", "--column", "3638", "--row", "2483",
        "--output", "json",
    ]);
    match cli.command {
        Command::Tile(args) => {
            assert_eq!(args.zoom, 12);
            assert_eq!(args.column, 3638);
            assert_eq!(args.row, 2483);
            assert_eq!(args.output, ReportFormat::Json);
        }
        _ => panic!("expected tile command"),
    }
}

#[test]
fn parse_slim_command() {
    let cli = Cli::parse_from([
        "vt-slim",
        "slim",
        "tokyo.mbtiles",
        "--style",
        "style.json",
        "--no-progress",
    ]);
    match cli.command {
        Command::Slim(args) => {
            assert_eq!(args.style.as_os_str(), "style.json");
            assert_eq!(args.output, None);
            assert!(args.no_progress);
        }
        _ => panic!("expected slim command"),
    }
}

#[test]
fn slim_requires_style() {
    assert!(Cli::try_parse_from(["vt-slim", "slim", "tokyo.mbtiles"]).is_err());
}

#[test]
fn parse_simplify_command() {
    let cli = Cli::parse_from([
        "vt-slim",
        "simplify",
        "tokyo.mbtiles",
        "--zoom",
        "12",
        "--column",
        "1",
        "--row",
        "2",
        "--layer",
        "roads",
        "--tolerance",
        "0.0001",
    ]);
    match cli.command {
        Command::Simplify(args) => {
            assert_eq!(args.layer, "roads");
            assert_eq!(args.tolerance, 0.0001);
        }
        _ => panic!("expected simplify command"),
    }
}

#[test]
fn parse_fetch_command() {
    let cli = Cli::parse_from([
        "vt-slim",
        "fetch",
        "https://tiles.example.com/14/14552/6451.pbf",
        "--tile",
        "14/14552/6451",
    ]);
    assert_eq!(cli.schema.variant(), None);
    match cli.command {
        Command::Fetch(args) => {
            assert_eq!(args.tile, "14/14552/6451");
            assert_eq!(args.timeout_secs, 30);
        }
        _ => panic!("expected fetch command"),
    }
}

#[test]
fn schema_arg_maps_to_variant() {
    assert_eq!(SchemaArg::Tiles.variant(), Some(SchemaVariant::Tiles));
    assert_eq!(SchemaArg::Auto.variant(), None);
}
