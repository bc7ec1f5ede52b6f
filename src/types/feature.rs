use geo::{Geometry, MultiPolygon};
use serde_json::{Map, Value};

use crate::geom::BBox;

/// Free-form GeoJSON feature properties.
pub type Properties = Map<String, Value>;

/// A GeoJSON-style feature with `geo` geometry.
///
/// `geometry` is `None` for null-geometry placeholders. `bbox` is filled in
/// whenever the feature enters a spatial index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub id: Option<String>,
    pub geometry: Option<Geometry<f64>>,
    pub properties: Properties,
    pub bbox: Option<BBox>,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self { geometry: Some(geometry.into()), ..Default::default() }
    }

    /// A feature without geometry.
    pub fn null() -> Self { Self::default() }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Stored bbox, or the geometry's bounding box when none is stored.
    pub fn bbox(&self) -> Option<BBox> {
        self.bbox.or_else(|| self.geometry.as_ref().and_then(BBox::of))
    }

    /// Compute and store the bbox if missing. Returns the bbox.
    pub fn ensure_bbox(&mut self) -> Option<BBox> {
        if self.bbox.is_none() {
            self.bbox = self.geometry.as_ref().and_then(BBox::of);
        }
        self.bbox
    }

    /// Polygonal geometry as a MultiPolygon, `None` for null or non-areal geometry.
    pub fn polygons(&self) -> Option<MultiPolygon<f64>> {
        self.geometry.as_ref().and_then(to_multipolygon)
    }

    /// Numeric property value, if present and a number.
    pub fn property_f64(&self, name: &str) -> Option<f64> {
        self.properties.get(name).and_then(Value::as_f64)
    }
}

/// A collection of features.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self { Self { features } }

    pub fn empty() -> Self { Self::default() }

    #[inline] pub fn len(&self) -> usize { self.features.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.features.is_empty() }
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self { Self::new(features) }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter { self.features.into_iter() }
}

/// Convert areal geometry into a MultiPolygon. Collections contribute their
/// polygonal members; points and lines yield `None`.
pub(crate) fn to_multipolygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon(vec![polygon.clone()])),
        Geometry::MultiPolygon(multi) => Some(multi.clone()),
        Geometry::Rect(rect) => Some(MultiPolygon(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => Some(MultiPolygon(vec![triangle.to_polygon()])),
        Geometry::GeometryCollection(collection) => {
            let polygons: Vec<_> = collection.iter()
                .filter_map(to_multipolygon)
                .flat_map(|multi| multi.0)
                .collect();
            (!polygons.is_empty()).then(|| MultiPolygon(polygons))
        }
        _ => None,
    }
}

/// Wrap a clip result as Polygon when it has one part, MultiPolygon otherwise,
/// or `None` when empty.
pub(crate) fn from_multipolygon(mut multi: MultiPolygon<f64>) -> Option<Geometry<f64>> {
    match multi.0.len() {
        0 => None,
        1 => multi.0.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(multi)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};

    #[test]
    fn bbox_is_computed_from_geometry() {
        let mut feature = Feature::new(polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0)]);
        assert_eq!(feature.bbox, None);
        assert_eq!(feature.ensure_bbox(), Some(BBox::new(0.0, 0.0, 2.0, 1.0)));
        assert_eq!(feature.bbox, Some(BBox::new(0.0, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn null_feature_has_no_bbox_or_polygons() {
        let mut feature = Feature::null();
        assert_eq!(feature.ensure_bbox(), None);
        assert!(feature.polygons().is_none());
    }

    #[test]
    fn points_are_not_polygonal() {
        assert!(Feature::new(point!(x: 1.0, y: 1.0)).polygons().is_none());
    }

    #[test]
    fn multipolygon_unwraps_to_polygon_when_single() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        assert!(matches!(from_multipolygon(MultiPolygon(vec![poly.clone()])), Some(Geometry::Polygon(_))));
        assert!(matches!(from_multipolygon(MultiPolygon(vec![poly.clone(), poly])), Some(Geometry::MultiPolygon(_))));
        assert!(from_multipolygon(MultiPolygon(vec![])).is_none());
    }
}
