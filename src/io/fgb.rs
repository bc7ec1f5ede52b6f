use std::io::Cursor;

use anyhow::{Context, Result};
use flatgeobuf::{FallibleStreamingIterator, FgbFeature, FgbReader};
use geozero::{ColumnValue, FeatureProperties, PropertyProcessor, ToGeo};
use serde_json::{Number, Value};

use crate::geom::BBox;
use crate::types::{Feature, Properties};

/// Collects FlatGeobuf column values into JSON properties.
#[derive(Default)]
struct JsonProperties(Properties);

impl PropertyProcessor for JsonProperties {
    fn property(&mut self, _idx: usize, name: &str, value: &ColumnValue) -> geozero::error::Result<bool> {
        let json = match value {
            ColumnValue::Byte(v) => Value::from(*v),
            ColumnValue::UByte(v) => Value::from(*v),
            ColumnValue::Bool(v) => Value::from(*v),
            ColumnValue::Short(v) => Value::from(*v),
            ColumnValue::UShort(v) => Value::from(*v),
            ColumnValue::Int(v) => Value::from(*v),
            ColumnValue::UInt(v) => Value::from(*v),
            ColumnValue::Long(v) => Value::from(*v),
            ColumnValue::ULong(v) => Value::from(*v),
            ColumnValue::Float(v) => Number::from_f64(f64::from(*v)).map_or(Value::Null, Value::Number),
            ColumnValue::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
            ColumnValue::String(s) | ColumnValue::DateTime(s) => Value::from(*s),
            ColumnValue::Json(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::from(*s)),
            _ => Value::Null,
        };
        self.0.insert(name.to_string(), json);
        Ok(false) // keep going
    }
}

fn to_feature(fgb: &FgbFeature) -> Result<Feature> {
    let geometry = fgb.to_geo().context("Failed to convert FlatGeobuf geometry")?;
    let mut properties = JsonProperties::default();
    fgb.process_properties(&mut properties)
        .context("Failed to read FlatGeobuf properties")?;

    let mut feature = Feature::new(geometry).with_properties(properties.0);
    feature.ensure_bbox();
    Ok(feature)
}

fn collect_features<I>(mut iter: I, filter: Option<&BBox>) -> Result<Vec<Feature>>
where
    I: FallibleStreamingIterator<Item = FgbFeature>,
    I::Error: std::error::Error + Send + Sync + 'static,
{
    let mut features = Vec::new();
    while let Some(fgb) = iter.next()? {
        let feature = to_feature(fgb)?;
        let keep = match (filter, feature.bbox) {
            (Some(filter), Some(bbox)) => filter.intersects(&bbox),
            _ => true,
        };
        if keep {
            features.push(feature);
        }
    }
    Ok(features)
}

/// Read the features of a FlatGeobuf file that intersect `bbox` (all features
/// when `None`). Files without a spatial index are scanned in full.
pub fn read_from_fgb_bytes(bytes: &[u8], bbox: Option<&BBox>) -> Result<Vec<Feature>> {
    let reader = FgbReader::open(Cursor::new(bytes)).context("Failed to open FlatGeobuf")?;

    let Some(b) = bbox else {
        return collect_features(reader.select_all().context("Failed to read FlatGeobuf features")?, None);
    };

    match reader.select_bbox(b.min_x, b.min_y, b.max_x, b.max_y) {
        Ok(iter) => collect_features(iter, None),
        Err(_) => {
            // No index: scan and filter by bbox
            let reader = FgbReader::open(Cursor::new(bytes)).context("Failed to open FlatGeobuf")?;
            collect_features(reader.select_all().context("Failed to read FlatGeobuf features")?, Some(b))
        }
    }
}
