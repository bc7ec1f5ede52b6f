use std::borrow::Borrow;

use ahash::AHashMap;
use geo::{BooleanOps, Intersects, MultiPolygon};
use rstar::RTree;
use serde_json::Value;

use crate::geom::BoundingBox;
use crate::types::{from_multipolygon, Feature, FeatureCollection};

/// Disjoint-set forest over feature indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self { Self { parent: (0..n).collect() } }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Group fragment indices by the value of `property` (missing counts as null),
/// in order of first appearance.
fn group_by_property(fragments: &[(&Feature, MultiPolygon<f64>)], property: &str) -> Vec<Vec<usize>> {
    let mut slots: AHashMap<String, usize> = AHashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, (feature, _)) in fragments.iter().enumerate() {
        let key = feature.properties.get(property).unwrap_or(&Value::Null).to_string();
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}

/// Group fragment indices into connected components of touching or
/// overlapping geometry.
fn group_by_adjacency(fragments: &[(&Feature, MultiPolygon<f64>)]) -> Vec<Vec<usize>> {
    let boxes: Vec<_> = fragments.iter()
        .enumerate()
        .filter_map(|(i, (feature, _))| feature.bbox().map(|bbox| BoundingBox::new(i, bbox)))
        .collect();
    let rtree = RTree::bulk_load(boxes);

    let mut sets = UnionFind::new(fragments.len());
    for bb in rtree.iter() {
        let i = bb.idx();
        for other in rtree.locate_in_envelope_intersecting(&bb.bbox().envelope()) {
            let j = other.idx();
            if j > i && fragments[i].1.intersects(&fragments[j].1) {
                sets.union(i, j);
            }
        }
    }

    let mut slots: AHashMap<usize, usize> = AHashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for i in 0..fragments.len() {
        let root = sets.find(i);
        let slot = *slots.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}

/// Merge polygon fragments back into whole features.
///
/// With `property`, fragments sharing that property value are merged (fast
/// path). Without it, fragments that touch or overlap are merged transitively.
/// Each output feature keeps the id and properties of its first fragment.
/// Features without polygonal geometry are dropped.
pub fn dissolve<F: Borrow<Feature>>(features: &[F], property: Option<&str>) -> FeatureCollection {
    let fragments: Vec<(&Feature, MultiPolygon<f64>)> = features.iter()
        .filter_map(|f| {
            let f: &Feature = f.borrow();
            f.polygons().map(|multi| (f, multi))
        })
        .collect();

    let groups = match property {
        Some(property) => group_by_property(&fragments, property),
        None => group_by_adjacency(&fragments),
    };

    let features = groups.into_iter()
        .filter_map(|group| {
            let (&first, rest) = group.split_first()?;
            let merged = rest.iter()
                .fold(fragments[first].1.clone(), |acc, &i| acc.union(&fragments[i].1));
            let geometry = from_multipolygon(merged)?;

            let template = fragments[first].0;
            let mut feature = Feature {
                id: template.id.clone(),
                geometry: Some(geometry),
                properties: template.properties.clone(),
                bbox: None,
            };
            feature.ensure_bbox();
            Some(feature)
        })
        .collect::<Vec<_>>();

    FeatureCollection::new(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{feature_area, BBox};
    use geo::{point, polygon, Geometry};

    fn square(x: f64, y: f64, name: &str) -> Feature {
        Feature::new(polygon![
            (x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0)
        ]).with_property("name", name)
    }

    #[test]
    fn merges_fragments_sharing_a_property() {
        let fragments = vec![square(0.0, 0.0, "a"), square(5.0, 5.0, "b"), square(1.0, 0.0, "a")];
        let dissolved = dissolve(&fragments, Some("name"));

        assert_eq!(dissolved.len(), 2);
        assert_eq!(dissolved.features[0].properties["name"], "a");
        assert_eq!(dissolved.features[0].bbox, Some(BBox::new(0.0, 0.0, 2.0, 1.0)));
        assert!(matches!(dissolved.features[0].geometry, Some(Geometry::Polygon(_))));
        assert_eq!(dissolved.features[1].properties["name"], "b");
    }

    #[test]
    fn same_property_far_apart_becomes_multipolygon() {
        let fragments = vec![square(0.0, 0.0, "a"), square(10.0, 0.0, "a")];
        let dissolved = dissolve(&fragments, Some("name"));
        assert_eq!(dissolved.len(), 1);
        assert!(matches!(dissolved.features[0].geometry, Some(Geometry::MultiPolygon(_))));
    }

    #[test]
    fn merges_touching_fragments_without_property() {
        // A chain 0-1-2 merges transitively; the far square stays alone
        let fragments = vec![
            square(0.0, 0.0, "x"),
            square(2.0, 0.0, "y"),
            square(1.0, 0.0, "z"),
            square(8.0, 8.0, "w"),
        ];
        let dissolved = dissolve(&fragments, None);

        assert_eq!(dissolved.len(), 2);
        assert_eq!(dissolved.features[0].properties["name"], "x");
        let expected = 3.0 * feature_area(&square(0.0, 0.0, ""));
        let merged = feature_area(&dissolved.features[0]);
        assert!((merged - expected).abs() / expected < 1e-6);
    }

    #[test]
    fn drops_non_polygonal_features_and_handles_empty_input() {
        let fragments = vec![Feature::null(), Feature::new(point!(x: 0.0, y: 0.0))];
        assert!(dissolve(&fragments, None).is_empty());

        let none: Vec<Feature> = vec![];
        assert!(dissolve(&none, Some("name")).is_empty());
    }
}
