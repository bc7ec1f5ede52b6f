use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One quantitative result keyed by metric, sketch and class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub metric_id: String,
    pub sketch_id: Option<String>,
    pub class_id: Option<String>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Metric {
    pub fn new(metric_id: impl Into<String>, value: f64) -> Self {
        Self {
            metric_id: metric_id.into(),
            sketch_id: None,
            class_id: None,
            value,
            extra: Map::new(),
        }
    }

    pub fn with_sketch_id(mut self, sketch_id: impl Into<String>) -> Self {
        self.sketch_id = Some(sketch_id.into());
        self
    }

    pub fn with_class_id(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// First metric matching `predicate`, if any.
pub fn first_matching_metric<'a>(metrics: &'a [Metric], predicate: impl Fn(&Metric) -> bool) -> Option<&'a Metric> {
    metrics.iter().find(|m| predicate(m))
}

/// Round `value` to `decimals` digits after the point.
///
/// With `keep_small_values`, a nonzero value that would round to exactly zero
/// is returned unrounded.
pub fn round_decimal(value: f64, decimals: u32, keep_small_values: bool) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if keep_small_values && value != 0.0 && rounded == 0.0 { value } else { rounded }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_six_digits() {
        assert_eq!(round_decimal(0.012_364_345_868_141_814, 6, true), 0.012_364);
        assert_eq!(round_decimal(1234.567_890_7, 6, false), 1234.567_891);
    }

    #[test]
    fn keeps_small_nonzero_values() {
        assert_eq!(round_decimal(1.2e-9, 6, true), 1.2e-9);
        assert_eq!(round_decimal(1.2e-9, 6, false), 0.0);
        assert_eq!(round_decimal(0.0, 6, true), 0.0);
    }

    #[test]
    fn serializes_camel_case() {
        let metric = Metric::new("area", 2.5).with_sketch_id("s1").with_extra("isCollection", true);
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["metricId"], "area");
        assert_eq!(json["sketchId"], "s1");
        assert_eq!(json["classId"], Value::Null);
        assert_eq!(json["extra"]["isCollection"], true);
    }

    #[test]
    fn finds_first_match() {
        let metrics = vec![Metric::new("a", 1.0).with_sketch_id("x"), Metric::new("a", 2.0).with_sketch_id("y")];
        let found = first_matching_metric(&metrics, |m| m.sketch_id.as_deref() == Some("y"));
        assert_eq!(found.map(|m| m.value), Some(2.0));
    }
}
