use geo::Geometry;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::geom::BBox;
use crate::io::geojson::parse_feature;
use crate::types::{Feature, Properties};

/// A user-drawn polygon being analyzed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sketch {
    pub id: String,
    pub name: String,
    /// `None` for null-geometry placeholders.
    pub geometry: Option<Geometry<f64>>,
    pub bbox: Option<BBox>,
    pub properties: Properties,
}

impl Sketch {
    pub fn new(id: impl Into<String>, name: impl Into<String>, geometry: impl Into<Geometry<f64>>) -> Self {
        Self { id: id.into(), name: name.into(), geometry: Some(geometry.into()), ..Default::default() }
    }

    /// A sketch standing in for "outside all valid areas".
    pub fn null(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), ..Default::default() }
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.bbox.or_else(|| self.geometry.as_ref().and_then(BBox::of))
    }

    /// Build from a GeoJSON feature; `properties.id` wins over the feature id.
    pub fn from_feature(feature: Feature) -> Self {
        let id = feature.properties.get("id")
            .and_then(value_as_string)
            .or(feature.id)
            .unwrap_or_default();
        let name = feature.properties.get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { id, name, geometry: feature.geometry, bbox: feature.bbox, properties: feature.properties }
    }

    /// View as a feature carrying the sketch id and name in its properties.
    pub fn to_feature(&self) -> Feature {
        let mut properties = self.properties.clone();
        properties.insert("id".into(), Value::from(self.id.clone()));
        properties.insert("name".into(), Value::from(self.name.clone()));
        Feature {
            id: Some(self.id.clone()),
            geometry: self.geometry.clone(),
            properties,
            bbox: self.bbox,
        }
    }
}

/// Sibling sketches grouped under one parent identity. Not nested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SketchCollection {
    pub id: String,
    pub name: String,
    pub bbox: Option<BBox>,
    pub properties: Properties,
    pub sketches: Vec<Sketch>,
}

impl SketchCollection {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sketches: Vec<Sketch>) -> Self {
        Self { id: id.into(), name: name.into(), sketches, ..Default::default() }
    }

    /// Stored bbox, or the union of the children's boxes.
    pub fn bbox(&self) -> Option<BBox> {
        self.bbox.or_else(|| self.sketches.iter()
            .filter_map(Sketch::bbox)
            .reduce(|a, b| a.union(&b)))
    }
}

/// Anything overlap computation accepts as the sketch side.
#[derive(Debug, Clone, PartialEq)]
pub enum SketchInput {
    Single(Sketch),
    Collection(SketchCollection),
    Many(Vec<Sketch>),
}

impl SketchInput {
    #[inline] pub fn is_collection(&self) -> bool { matches!(self, Self::Collection(_)) }

    /// Flatten to the individual sketches.
    pub fn sketches(&self) -> &[Sketch] {
        match self {
            Self::Single(sketch) => std::slice::from_ref(sketch),
            Self::Collection(collection) => &collection.sketches,
            Self::Many(sketches) => sketches,
        }
    }

    /// Parse a GeoJSON sketch (Feature) or sketch collection (FeatureCollection).
    pub fn from_geojson(value: &Value) -> Result<Self> {
        match value["type"].as_str() {
            Some("Feature") => {
                let feature = parse_feature(value).map_err(Error::decode)?;
                Ok(Self::Single(Sketch::from_feature(feature)))
            }
            Some("FeatureCollection") => {
                let sketches = value["features"].as_array()
                    .ok_or_else(|| Error::Validation("FeatureCollection without features".into()))?
                    .iter()
                    .map(|f| parse_feature(f).map(Sketch::from_feature))
                    .collect::<anyhow::Result<Vec<_>>>()
                    .map_err(Error::decode)?;

                let properties = value["properties"].as_object().cloned().unwrap_or_default();
                let is_collection = properties.get("isCollection").and_then(Value::as_bool).unwrap_or(false)
                    || properties.contains_key("id");
                if !is_collection {
                    return Ok(Self::Many(sketches));
                }

                let bbox = serde_json::from_value::<BBox>(value["bbox"].clone()).ok();
                Ok(Self::Collection(SketchCollection {
                    id: properties.get("id").and_then(value_as_string).unwrap_or_default(),
                    name: properties.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    bbox,
                    properties,
                    sketches,
                }))
            }
            other => Err(Error::Validation(format!("Expected Feature or FeatureCollection sketch, got {other:?}"))),
        }
    }
}

impl From<Sketch> for SketchInput {
    fn from(sketch: Sketch) -> Self { Self::Single(sketch) }
}

impl From<SketchCollection> for SketchInput {
    fn from(collection: SketchCollection) -> Self { Self::Collection(collection) }
}

impl From<Vec<Sketch>> for SketchInput {
    fn from(sketches: Vec<Sketch>) -> Self { Self::Many(sketches) }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
