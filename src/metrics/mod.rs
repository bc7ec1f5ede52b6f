mod overlap;

pub use overlap::{overlap_features, OverlapFeaturesOptions, OverlapOperation};
