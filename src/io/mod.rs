pub(crate) mod fgb;
pub(crate) mod geojson;

pub use fgb::read_from_fgb_bytes;
pub use geojson::{features_to_value, read_from_geojson_bytes, write_to_geojson_bytes};
