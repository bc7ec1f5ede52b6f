mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{fetch, info, overlap};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    match &cli.command {
        Commands::Fetch(args) => fetch::run(&cli, args).await,
        Commands::Overlap(args) => overlap::run(&cli, args).await,
        Commands::Info(args) => info::run(&cli, args).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> { run().await }
