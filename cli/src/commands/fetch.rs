use anyhow::Result;
use tilesketch::{features_to_value, TiledDataset, TiledVectorCache, VectorDataSourceOptions};
use tracing::info;

pub async fn run(_cli: &crate::cli::Cli, args: &crate::cli::FetchArgs) -> Result<()> {
    let options = VectorDataSourceOptions { cache_size: args.cache_size, ..Default::default() };
    let cache = TiledVectorCache::http(TiledDataset::with_options(&args.url, options))?;

    let value = match &args.union_property {
        Some(property) => features_to_value(&cache.fetch_union(&args.bbox, Some(property)).await?.features),
        None => features_to_value(&cache.fetch(&args.bbox).await?),
    };
    info!(count = value["features"].as_array().map_or(0, Vec::len), bundles = cache.resident_bundles().len(), "fetched features");

    match &args.output {
        Some(path) => std::fs::write(path, serde_json::to_vec(&value)?)?,
        None => println!("{}", serde_json::to_string(&value)?),
    }
    Ok(())
}
