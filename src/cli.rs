use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::mbtiles::SchemaVariant;

#[derive(Debug, Parser)]
#[command(name = "vt-slim", version, about = "MBTiles vector tile inspection and slimming CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Tile storage layout to use instead of detecting it
    #[arg(long, global = true, value_enum, default_value_t = SchemaArg::Auto)]
    pub schema: SchemaArg,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Inspect(InspectArgs),
    Tile(TileArgs),
    Slim(SlimArgs),
    Simplify(SimplifyArgs),
    Fetch(FetchArgs),
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    pub input: PathBuf,

    #[arg(long)]
    pub zoom: Option<u8>,

    #[arg(long)]
    pub bucket: Option<usize>,

    #[arg(long, default_value_t = 10)]
    pub buckets: usize,

    #[arg(long)]
    pub tile_size_limit_kb: Option<f64>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,

    #[arg(long, default_value_t = false)]
    pub no_color: bool,
}

#[derive(Debug, Args)]
pub struct TileArgs {
    pub input: PathBuf,

    #[arg(long)]
    pub zoom: u8,

    #[arg(long)]
    pub column: u32,

    #[arg(long)]
    pub row: u32,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,
}

#[derive(Debug, Args)]
pub struct SlimArgs {
    pub input: PathBuf,

    #[arg(long)]
    pub style: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct SimplifyArgs {
    pub input: PathBuf,

    #[arg(long)]
    pub zoom: u8,

    #[arg(long)]
    pub column: u32,

    #[arg(long)]
    pub row: u32,

    #[arg(long)]
    pub layer: String,

    #[arg(long)]
    pub tolerance: f64,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    pub url: String,

    /// Tile address as z/x/y (XYZ scheme)
    #[arg(long)]
    pub tile: String,

    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Ndjson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaArg {
    Auto,
    Tiles,
    #[value(name = "map-images")]
    MapImages,
}

impl SchemaArg {
    pub fn variant(self) -> Option<SchemaVariant> {
        match self {
            SchemaArg::Auto => None,
            SchemaArg::Tiles => Some(SchemaVariant::Tiles),
            SchemaArg::MapImages => Some(SchemaVariant::MapImages),
        }
    }
}
