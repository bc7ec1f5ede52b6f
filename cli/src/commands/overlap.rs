use anyhow::{anyhow, Result};
use tilesketch::{overlap_features, OverlapFeaturesOptions, SketchInput, TiledDataset, TiledVectorCache};

pub async fn run(_cli: &crate::cli::Cli, args: &crate::cli::OverlapArgs) -> Result<()> {
    let bytes = std::fs::read(&args.sketch)?;
    let sketch = SketchInput::from_geojson(&serde_json::from_slice(&bytes)?)?;
    let bbox = sketch.sketches().iter()
        .filter_map(|s| s.bbox())
        .reduce(|a, b| a.union(&b))
        .ok_or_else(|| anyhow!("Sketch {} has no geometry", args.sketch.display()))?;

    let cache = TiledVectorCache::http(TiledDataset::new(&args.url))?;
    let features = cache.fetch(&bbox).await?;

    let options = OverlapFeaturesOptions {
        operation: args.operation.into(),
        sum_property: args.sum_property.clone(),
        include_child_metrics: !args.collection_only,
        ..Default::default()
    };
    let metrics = overlap_features(&args.metric_id, &features, &sketch, &options)?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
