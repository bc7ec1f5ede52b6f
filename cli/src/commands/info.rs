use anyhow::Result;
use tilesketch::{TiledDataset, TiledVectorCache};

pub async fn run(_cli: &crate::cli::Cli, args: &crate::cli::InfoArgs) -> Result<()> {
    let cache = TiledVectorCache::http(TiledDataset::new(&args.url))?;
    let metadata = cache.load_metadata().await?;
    println!("{}", serde_json::to_string_pretty(metadata)?);
    Ok(())
}
