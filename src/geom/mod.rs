mod algorithm;
mod bbox;
mod geom;

pub use bbox::BBox;
pub(crate) use bbox::BoundingBox;
pub use geom::{area, feature_area, truncate_feature, truncate_geometry, truncate_sketch, COORD_PRECISION};
pub use algorithm::antimeridian::{split_geometry_antimeridian, split_sketch_antimeridian};
pub use algorithm::clip::{clip, clip_multi_merge, intersect_in_chunks, ClipOperation, DEFAULT_CHUNK_SIZE};
pub use algorithm::dissolve::dissolve;
