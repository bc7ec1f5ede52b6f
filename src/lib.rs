#![doc = "tilesketch: tiled vector caching and sketch overlap metrics"]
mod error;
mod geom;
mod io;
mod metrics;
mod provider;
mod source;
mod types;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use geom::{
    area, clip, clip_multi_merge, dissolve, feature_area, intersect_in_chunks, split_geometry_antimeridian,
    split_sketch_antimeridian, truncate_feature, truncate_geometry, truncate_sketch, BBox, ClipOperation,
    COORD_PRECISION, DEFAULT_CHUNK_SIZE,
};

#[doc(inline)]
pub use io::{features_to_value, read_from_fgb_bytes, read_from_geojson_bytes, write_to_geojson_bytes};

#[doc(inline)]
pub use metrics::{overlap_features, OverlapFeaturesOptions, OverlapOperation};

#[doc(inline)]
pub use provider::{
    get_datasource_features, get_features_for_sketch_bboxes, load_datasources, load_fgb, load_fgb_with_retry,
    DatasourceConfig, GetDatasourceFeaturesOptions, RetryPolicy, VectorDatasource, VectorPropertyFilter,
};

#[doc(inline)]
pub use source::{
    Bundle, BundleDecoder, BundleId, BundleIndex, DatasourceRegistry, FlatGeobufDecoder, GeoJsonDecoder,
    HttpSource, IndexDescriptor, MemSource, Metadata, Priority, RemoteSource, TiledDataset, TiledVectorCache,
    VectorDataSourceOptions, URL_PROPERTY,
};

#[doc(inline)]
pub use types::{
    first_matching_metric, round_decimal, Feature, FeatureCollection, Metric, Properties, Sketch, SketchCollection,
    SketchInput,
};
