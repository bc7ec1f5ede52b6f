use std::path::PathBuf;

use tilesketch::{BBox, OverlapOperation};

/// Tiled vector data CLI
#[derive(clap::Parser, Debug)]
#[command(name = "tilesketch", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Fetch features of a subdivided dataset within a bbox as GeoJSON
    Fetch(FetchArgs),

    /// Compute overlap metrics of a sketch against a subdivided dataset
    Overlap(OverlapArgs),

    /// Print dataset metadata
    Info(InfoArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Dataset base URL
    pub url: String,

    /// Query box as "min_x,min_y,max_x,max_y"
    #[arg(short, long, allow_hyphen_values = true)]
    pub bbox: BBox,

    /// Dissolve fragments sharing this property value
    #[arg(long)]
    pub union_property: Option<String>,

    /// Maximum number of resident bundles
    #[arg(long, default_value_t = 250)]
    pub cache_size: usize,

    /// Output GeoJSON file, defaults to stdout
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct OverlapArgs {
    /// Dataset base URL
    pub url: String,

    /// Sketch or sketch collection GeoJSON file
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub sketch: PathBuf,

    /// Metric id attached to every result
    #[arg(short, long, default_value = "overlap")]
    pub metric_id: String,

    /// Overlap measure
    #[arg(long, value_enum, default_value_t = Operation::Area)]
    pub operation: Operation,

    /// Property summed by the "sum" operation
    #[arg(long)]
    pub sum_property: Option<String>,

    /// Omit per-sketch metrics of a collection
    #[arg(long)]
    pub collection_only: bool,
}

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// Dataset base URL
    pub url: String,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Overlap area in square meters
    Area,
    /// Count of overlapping features, or the sum of `--sum-property`
    Sum,
}

impl From<Operation> for OverlapOperation {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Area => OverlapOperation::Area,
            Operation::Sum => OverlapOperation::Sum,
        }
    }
}
