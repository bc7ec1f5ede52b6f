//! Loaders that read features out of configured datasources.

mod datasource;
mod fgb;
mod sketch_bboxes;

pub use datasource::{
    get_datasource_features, load_datasources, DatasourceConfig, GetDatasourceFeaturesOptions,
    VectorDatasource, VectorPropertyFilter,
};
pub use fgb::{load_fgb, load_fgb_with_retry, RetryPolicy};
pub use sketch_bboxes::get_features_for_sketch_bboxes;
