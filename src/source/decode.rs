use std::fmt::Debug;

use anyhow::Result;

use crate::io::{read_from_fgb_bytes, read_from_geojson_bytes};
use crate::types::FeatureCollection;

/// Turns one bundle's bytes into features.
pub trait BundleDecoder: Debug + Send + Sync {
    /// File extension of bundles, without the dot.
    fn extension(&self) -> &str;

    fn decode(&self, bytes: &[u8]) -> Result<FeatureCollection>;
}

/// Bundles stored as GeoJSON FeatureCollections (`.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonDecoder;

impl BundleDecoder for GeoJsonDecoder {
    fn extension(&self) -> &str { "json" }

    fn decode(&self, bytes: &[u8]) -> Result<FeatureCollection> {
        read_from_geojson_bytes(bytes)
    }
}

/// Bundles stored as FlatGeobuf files (`.fgb`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatGeobufDecoder;

impl BundleDecoder for FlatGeobufDecoder {
    fn extension(&self) -> &str { "fgb" }

    fn decode(&self, bytes: &[u8]) -> Result<FeatureCollection> {
        read_from_fgb_bytes(bytes, None).map(FeatureCollection::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fgb::tests::write_fgb;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn decoders_read_their_formats() {
        let json = br#"{"type": "FeatureCollection", "features": []}"#;
        assert!(GeoJsonDecoder.decode(json).unwrap().is_empty());
        assert_eq!(GeoJsonDecoder.extension(), "json");

        let shape = MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]]);
        let fgb = write_fgb(&[shape]);
        assert_eq!(FlatGeobufDecoder.decode(&fgb).unwrap().len(), 1);
        assert_eq!(FlatGeobufDecoder.extension(), "fgb");

        assert!(FlatGeobufDecoder.decode(json).is_err());
    }
}
