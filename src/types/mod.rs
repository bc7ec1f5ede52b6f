mod feature;
mod metric;
mod sketch;

pub use feature::{Feature, FeatureCollection, Properties};
pub(crate) use feature::{from_multipolygon, to_multipolygon};
pub use metric::{first_matching_metric, round_decimal, Metric};
pub use sketch::{Sketch, SketchCollection, SketchInput};
