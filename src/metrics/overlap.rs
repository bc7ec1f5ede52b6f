use std::borrow::Borrow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::geom::{clip, feature_area, intersect_in_chunks, truncate_feature, truncate_sketch,
    ClipOperation, DEFAULT_CHUNK_SIZE};
use crate::types::{round_decimal, Feature, Metric, Sketch, SketchInput};

/// Digits kept when rounding metric values.
const VALUE_PRECISION: u32 = 6;

/// How overlap with candidate features is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapOperation {
    /// Square meters of intersection.
    #[default]
    Area,
    /// Count of intersecting features, or the sum of a numeric property.
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlapFeaturesOptions {
    pub operation: OverlapOperation,
    /// Candidates per intersection chunk for the area operation.
    pub chunk_size: usize,
    /// Emit per-sketch metrics alongside the collection metric.
    pub include_child_metrics: bool,
    /// Property summed by the sum operation; each feature counts 1 without it.
    pub sum_property: Option<String>,
    /// Round values to 6 digits, keeping tiny nonzero values as is.
    pub truncate: bool,
}

impl Default for OverlapFeaturesOptions {
    fn default() -> Self {
        Self {
            operation: OverlapOperation::Area,
            chunk_size: DEFAULT_CHUNK_SIZE,
            include_child_metrics: true,
            sum_property: None,
            truncate: true,
        }
    }
}

/// Result of overlapping one sketch geometry with the candidates.
struct Intersection {
    value: f64,
    /// Candidate indices that intersected (sum operation only).
    indices: Vec<usize>,
}

/// Value a candidate contributes to a sum: a non-negative numeric property,
/// otherwise 1.
fn sum_value(feature: &Feature, sum_property: Option<&str>) -> f64 {
    sum_property
        .and_then(|name| feature.property_f64(name))
        .filter(|v| *v >= 0.0)
        .unwrap_or(1.0)
}

fn intersect_area(subject: &Feature, candidates: &[Feature], chunk_size: usize) -> Result<Intersection> {
    let Some(bbox) = subject.bbox() else {
        return Ok(Intersection { value: 0.0, indices: vec![] });
    };
    let nearby: Vec<&Feature> = candidates.iter()
        .filter(|f| f.bbox().is_some_and(|b| b.intersects(&bbox)))
        .collect();

    let value = intersect_in_chunks(subject, &nearby, chunk_size)?
        .iter()
        .map(feature_area)
        .sum();
    Ok(Intersection { value, indices: vec![] })
}

fn intersect_sum(subject: &Feature, candidates: &[Feature], sum_property: Option<&str>) -> Result<Intersection> {
    let Some(bbox) = subject.bbox() else {
        return Ok(Intersection { value: 0.0, indices: vec![] });
    };

    let mut value = 0.0;
    let mut indices = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.polygons().is_none() || !candidate.bbox().is_some_and(|b| b.intersects(&bbox)) {
            continue;
        }
        if clip(&[subject, candidate], ClipOperation::Intersection)?.is_some() {
            indices.push(i);
            value += sum_value(candidate, sum_property);
        }
    }
    Ok(Intersection { value, indices })
}

fn intersect(subject: &Feature, candidates: &[Feature], options: &OverlapFeaturesOptions) -> Result<Intersection> {
    if subject.polygons().is_none() || candidates.is_empty() {
        return Ok(Intersection { value: 0.0, indices: vec![] });
    }
    match options.operation {
        OverlapOperation::Area => intersect_area(subject, candidates, options.chunk_size),
        OverlapOperation::Sum => intersect_sum(subject, candidates, options.sum_property.as_deref()),
    }
}

/// Footprint of all sketches as one feature, `None` when none has geometry.
fn union_of(sketches: &[Sketch]) -> Result<Option<Feature>> {
    let features: Vec<Feature> = sketches.iter()
        .filter(|s| s.geometry.is_some())
        .map(Sketch::to_feature)
        .filter(|f| f.polygons().is_some())
        .collect();
    if features.is_empty() {
        return Ok(None);
    }
    clip(&features, ClipOperation::Union)
}

/// Overlap between sketch(es) and polygon `features`, as one metric per sketch
/// plus, for a sketch collection, one metric for the collection as a whole.
///
/// The collection metric counts overlap between sibling sketches once: area
/// is measured against the union of the siblings, and a sum counts every
/// candidate touched by any sibling exactly once. Sketches without geometry
/// and an empty `features` list produce zero values.
pub fn overlap_features<F: Borrow<Feature>>(
    metric_id: &str,
    features: &[F],
    sketch: &SketchInput,
    options: &OverlapFeaturesOptions,
) -> Result<Vec<Metric>> {
    let sketches: Vec<Sketch> = sketch.sketches().iter().map(truncate_sketch).collect();
    let candidates: Vec<Feature> = features.iter().map(|f| truncate_feature(f.borrow())).collect();

    let round = |value: f64| if options.truncate {
        round_decimal(value, VALUE_PRECISION, true)
    } else {
        value
    };

    let mut touched = BTreeSet::new();
    let mut metrics = Vec::with_capacity(sketches.len() + 1);
    for s in &sketches {
        let result = intersect(&s.to_feature(), &candidates, options)?;
        touched.extend(result.indices);

        debug!(metric_id, sketch_id = %s.id, value = result.value, "sketch overlap");
        metrics.push(Metric::new(metric_id, round(result.value))
            .with_sketch_id(s.id.clone())
            .with_extra("sketchName", s.name.clone()));
    }

    if !options.include_child_metrics {
        metrics.clear();
    }

    let SketchInput::Collection(collection) = sketch else {
        return Ok(metrics);
    };

    let value = match options.operation {
        OverlapOperation::Sum => touched.iter()
            .map(|&i| sum_value(&candidates[i], options.sum_property.as_deref()))
            .sum(),
        OverlapOperation::Area => match union_of(&sketches)? {
            Some(footprint) => intersect(&footprint, &candidates, options)?.value,
            None => 0.0,
        },
    };

    debug!(metric_id, collection_id = %collection.id, value, "collection overlap");
    metrics.push(Metric::new(metric_id, round(value))
        .with_sketch_id(collection.id.clone())
        .with_extra("sketchName", collection.name.clone())
        .with_extra("isCollection", Value::Bool(true)));

    Ok(metrics)
}
