use ahash::AHashSet;
use futures::future::try_join_all;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::io::geojson::geometry_to_value;
use crate::provider::fgb::load_fgb;
use crate::source::RemoteSource;
use crate::types::{Feature, SketchInput};

/// Identity used to drop duplicates: the feature id, else the
/// `unique_id_property` value, else a hash of the geometry.
fn identity(feature: &Feature, unique_id_property: Option<&str>) -> String {
    if let Some(id) = &feature.id {
        return format!("id:{id}");
    }
    let unique = unique_id_property
        .and_then(|name| feature.properties.get(name))
        .filter(|value| !value.is_null());
    if let Some(value) = unique {
        return match value {
            Value::String(s) => format!("prop:{s}"),
            other => format!("prop:{other}"),
        };
    }
    let geometry = feature.geometry.as_ref().map(geometry_to_value).unwrap_or(Value::Null);
    format!("hash:{}", hex::encode(Sha256::digest(geometry.to_string().as_bytes())))
}

/// Features of the FlatGeobuf at `url` intersecting the bbox of any sketch,
/// loaded per sketch (split on the antimeridian) and de-duplicated.
///
/// Features matched by several sketches are kept once, identified by
/// feature id, then `unique_id_property`, then geometry. Geometrically
/// identical features without either identifier collapse into one.
pub async fn get_features_for_sketch_bboxes(
    source: &dyn RemoteSource,
    sketch: &SketchInput,
    url: &str,
    unique_id_property: Option<&str>,
) -> Result<Vec<Feature>> {
    let boxes: Vec<_> = sketch.sketches().iter()
        .filter_map(|s| s.bbox())
        .flat_map(|bbox| bbox.split_antimeridian())
        .collect();

    let loads = boxes.iter().map(|bbox| load_fgb(source, url, Some(bbox)));
    let results = try_join_all(loads).await?;

    let mut seen = AHashSet::new();
    let features = results.into_iter()
        .flatten()
        .filter(|feature| seen.insert(identity(feature, unique_id_property)))
        .collect();
    Ok(features)
}
