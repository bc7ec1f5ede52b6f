use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use geo::{BooleanOps, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{from_multipolygon, Feature};

/// Candidates per chunk in [`intersect_in_chunks`] when none is given.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Boolean polygon operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipOperation {
    Union,
    Intersection,
    Xor,
    Difference,
}

impl ClipOperation {
    fn apply(self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            Self::Union => a.union(b),
            Self::Intersection => a.intersection(b),
            Self::Xor => a.xor(b),
            Self::Difference => a.difference(b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::Intersection => "intersection",
            Self::Xor => "xor",
            Self::Difference => "difference",
        }
    }
}

impl fmt::Display for ClipOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ClipOperation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "intersection" => Ok(Self::Intersection),
            "xor" => Ok(Self::Xor),
            "difference" => Ok(Self::Difference),
            _ => Err(anyhow!("Unknown clip operation: {s}. Expected union, intersection, xor or difference")),
        }
    }
}

fn into_feature(result: MultiPolygon<f64>) -> Option<Feature> {
    from_multipolygon(result).map(|geometry| {
        let mut feature = Feature::new(geometry);
        feature.ensure_bbox();
        feature
    })
}

/// Apply `op` with the first feature as subject and every remaining feature
/// as the other operand, e.g. `a - b - c` for difference.
///
/// Returns `None` for an empty result, a Polygon feature for a single part and
/// a MultiPolygon feature otherwise. Features without polygonal geometry are
/// skipped. Meant for small operand sets such as a handful of sketches; use
/// [`clip_multi_merge`] for large candidate lists.
pub fn clip<F: Borrow<Feature>>(features: &[F], op: ClipOperation) -> Result<Option<Feature>> {
    if features.is_empty() {
        return Err(Error::Validation("Missing or empty features for clip".into()));
    }

    let mut operands = features.iter().filter_map(|f| f.borrow().polygons());
    let Some(subject) = operands.next() else {
        return Err(Error::Validation("No polygonal geometry in features for clip".into()));
    };

    let rest: Vec<_> = operands.collect();
    let result = if rest.is_empty() {
        // Normalize a lone operand
        subject.union(&MultiPolygon(vec![]))
    } else {
        rest.iter().fold(subject, |acc, other| op.apply(&acc, other))
    };

    Ok(into_feature(result))
}

/// Apply `op` between `subject` and all `candidates` at once, after merging the
/// candidates into one multi-part coordinate array (no geometric union).
///
/// Candidates are expected not to overlap each other, as in a single dataset
/// layer. Fails with a validation error if `subject` has no polygonal geometry
/// or `candidates` is empty.
pub fn clip_multi_merge<F: Borrow<Feature>>(
    subject: &Feature,
    candidates: &[F],
    op: ClipOperation,
) -> Result<Option<Feature>> {
    let Some(subject) = subject.polygons() else {
        return Err(Error::Validation("Missing polygonal subject for clip".into()));
    };
    if candidates.is_empty() {
        return Err(Error::Validation("Missing or empty features for clip".into()));
    }

    let merged = MultiPolygon(candidates.iter()
        .filter_map(|f| f.borrow().polygons())
        .flat_map(|multi| multi.0)
        .collect());

    Ok(into_feature(op.apply(&subject, &merged)))
}

/// Intersect `subject` with `candidates` split into chunks of `chunk_size`
/// (0 means [`DEFAULT_CHUNK_SIZE`]), returning the non-empty per-chunk results.
///
/// Every candidate lands in exactly one chunk, so summing the result areas
/// never double counts.
pub fn intersect_in_chunks<F: Borrow<Feature>>(
    subject: &Feature,
    candidates: &[F],
    chunk_size: usize,
) -> Result<Vec<Feature>> {
    let chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };

    let mut results = Vec::new();
    for chunk in candidates.chunks(chunk_size) {
        if let Some(feature) = clip_multi_merge(subject, chunk, ClipOperation::Intersection)? {
            results.push(feature);
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{feature_area, BBox};
    use geo::{polygon, Geometry};

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Feature {
        Feature::new(polygon![
            (x: min_x, y: min_y), (x: max_x, y: min_y), (x: max_x, y: max_y), (x: min_x, y: max_y)
        ])
    }

    /// `n` x `n` grid of non-overlapping unit-ish cells covering [0, 1] x [0, 1].
    fn grid(n: usize) -> Vec<Feature> {
        let step = 1.0 / n as f64;
        (0..n * n).map(|i| {
            let (col, row) = ((i % n) as f64, (i / n) as f64);
            rect(col * step, row * step, (col + 1.0) * step, (row + 1.0) * step)
        }).collect()
    }

    #[test]
    fn union_of_overlapping_squares() {
        let result = clip(&[rect(0.0, 0.0, 2.0, 2.0), rect(1.0, 1.0, 3.0, 3.0)], ClipOperation::Union)
            .unwrap()
            .unwrap();
        assert!(matches!(result.geometry, Some(Geometry::Polygon(_))));
        assert_eq!(result.bbox, Some(BBox::new(0.0, 0.0, 3.0, 3.0)));
    }

    #[test]
    fn union_of_disjoint_squares_is_multipolygon() {
        let result = clip(&[rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 5.0, 6.0, 6.0)], ClipOperation::Union)
            .unwrap()
            .unwrap();
        assert!(matches!(result.geometry, Some(Geometry::MultiPolygon(ref mp)) if mp.0.len() == 2));
    }

    #[test]
    fn intersection_of_disjoint_squares_is_none() {
        let result = clip(&[rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 5.0, 6.0, 6.0)], ClipOperation::Intersection);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn difference_and_xor_areas() {
        let a = rect(0.0, 0.0, 2.0, 1.0);
        let b = rect(1.0, 0.0, 3.0, 1.0);
        let half = feature_area(&rect(0.0, 0.0, 1.0, 1.0));

        let diff = clip(&[a.clone(), b.clone()], ClipOperation::Difference).unwrap().unwrap();
        assert!((feature_area(&diff) - half).abs() / half < 1e-6);

        let xor = clip(&[a, b], ClipOperation::Xor).unwrap().unwrap();
        assert!((feature_area(&xor) - 2.0 * half).abs() / half < 1e-3);
    }

    #[test]
    fn empty_input_is_a_validation_error() {
        let none: Vec<Feature> = vec![];
        assert!(matches!(clip(&none, ClipOperation::Union), Err(Error::Validation(_))));
        assert!(matches!(
            clip_multi_merge(&rect(0.0, 0.0, 1.0, 1.0), &none, ClipOperation::Intersection),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            clip_multi_merge(&Feature::null(), &[rect(0.0, 0.0, 1.0, 1.0)], ClipOperation::Intersection),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn multi_merge_intersection_matches_covered_area() {
        let subject = rect(0.25, 0.25, 0.75, 0.75);
        let merged = clip_multi_merge(&subject, &grid(4), ClipOperation::Intersection).unwrap().unwrap();
        let expected = feature_area(&subject);
        assert!((feature_area(&merged) - expected).abs() / expected < 1e-6);
    }

    #[test]
    fn chunk_size_does_not_change_total_area() {
        let subject = rect(0.1, 0.1, 0.9, 0.7);
        let candidates = grid(6);
        let n = candidates.len();

        let total = |chunk_size: usize| -> f64 {
            intersect_in_chunks(&subject, &candidates, chunk_size).unwrap()
                .iter()
                .map(feature_area)
                .sum()
        };

        let whole = total(n);
        for chunk_size in [n / 2, 1, 0] {
            let chunked = total(chunk_size);
            assert!((chunked - whole).abs() / whole < 1e-9, "chunk {chunk_size}: {chunked} vs {whole}");
        }
        assert_eq!(intersect_in_chunks(&subject, &candidates, 1).unwrap().len(), 24);
    }

    #[test]
    fn no_candidates_yields_no_chunks() {
        let none: Vec<Feature> = vec![];
        assert!(intersect_in_chunks(&rect(0.0, 0.0, 1.0, 1.0), &none, 10).unwrap().is_empty());
    }

    #[test]
    fn parses_operation_names() {
        assert_eq!("Union".parse::<ClipOperation>().unwrap(), ClipOperation::Union);
        assert!("merge".parse::<ClipOperation>().is_err());
        assert_eq!(ClipOperation::Xor.to_string(), "xor");
    }
}
