use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geom::BBox;
use crate::provider::fgb::load_fgb;
use crate::provider::sketch_bboxes::get_features_for_sketch_bboxes;
use crate::source::DatasourceRegistry;
use crate::types::{Feature, SketchInput};

/// Keep features whose `property` equals one of `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPropertyFilter {
    pub property: String,
    pub values: Vec<Value>,
}

impl VectorPropertyFilter {
    pub fn new(property: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self { property: property.into(), values: values.into_iter().map(Into::into).collect() }
    }

    /// Numbers compare by value, so `3` matches `3.0`.
    pub fn matches(&self, feature: &Feature) -> bool {
        let Some(value) = feature.properties.get(&self.property) else { return false };
        self.values.iter().any(|candidate| match (candidate.as_f64(), value.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => candidate == value,
        })
    }
}

/// One `datasources.json` record as written on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDatasource {
    datasource_id: String,
    #[serde(rename = "geo_type")]
    geo_type: String,
    #[serde(default)]
    formats: Vec<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    property_filter: Option<VectorPropertyFilter>,
    #[serde(default)]
    bbox_filter: Option<BBox>,
    #[serde(default)]
    union_property: Option<String>,
}

/// Settings shared by every kind of vector datasource.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasourceConfig {
    pub datasource_id: String,
    /// Published location, absent for internal datasources.
    pub url: Option<String>,
    pub property_filter: Option<VectorPropertyFilter>,
    pub bbox_filter: Option<BBox>,
    pub union_property: Option<String>,
}

/// A vector datasource resolved to the single access path it is read with.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorDatasource {
    /// Project-hosted FlatGeobuf.
    Internal(DatasourceConfig),
    /// External dataset published as subdivided bundles, read through a
    /// [`TiledVectorCache`](crate::source::TiledVectorCache).
    ExternalSubdivided(DatasourceConfig),
    /// External FlatGeobuf file.
    ExternalFlatGeobuf(DatasourceConfig),
}

impl VectorDatasource {
    pub fn config(&self) -> &DatasourceConfig {
        match self {
            Self::Internal(config) | Self::ExternalSubdivided(config) | Self::ExternalFlatGeobuf(config) => config,
        }
    }

    #[inline]
    pub fn datasource_id(&self) -> &str { &self.config().datasource_id }

    fn resolve(raw: RawDatasource) -> Result<Option<Self>> {
        if raw.geo_type != "vector" {
            debug!(datasource = %raw.datasource_id, geo_type = %raw.geo_type, "skipping non-vector datasource");
            return Ok(None);
        }
        let has = |format: &str| raw.formats.iter().any(|f| f == format);
        let external = raw.url.is_some();
        let subdivided = has("subdivided");
        let fgb = has("fgb");
        let id = raw.datasource_id.clone();

        let config = DatasourceConfig {
            datasource_id: raw.datasource_id,
            url: raw.url,
            property_filter: raw.property_filter,
            bbox_filter: raw.bbox_filter,
            union_property: raw.union_property,
        };
        let datasource = match (external, subdivided, fgb) {
            (true, true, _) => Self::ExternalSubdivided(config),
            (true, false, true) => Self::ExternalFlatGeobuf(config),
            (false, _, true) => Self::Internal(config),
            _ => return Err(Error::Config(format!("Datasource {id} has no usable vector format"))),
        };
        Ok(Some(datasource))
    }
}

/// Parse a `datasources.json` document into the vector datasources it lists.
/// Raster records are skipped.
pub fn load_datasources(bytes: &[u8]) -> Result<Vec<VectorDatasource>> {
    let records: Vec<RawDatasource> = serde_json::from_slice(bytes)
        .map_err(|e| Error::Config(format!("Invalid datasources file: {e}")))?;

    let datasources = records.into_iter()
        .filter_map(|raw| VectorDatasource::resolve(raw).transpose())
        .collect::<Result<Vec<_>>>()?;
    info!(count = datasources.len(), "loaded vector datasources");
    Ok(datasources)
}

/// Optional narrowing for [`get_datasource_features`].
#[derive(Debug, Clone, Default)]
pub struct GetDatasourceFeaturesOptions {
    /// Only features overlapping this box.
    pub bbox: Option<BBox>,
    pub property_filter: Option<VectorPropertyFilter>,
    /// Rebuild subdivided polygons sharing this property value.
    pub union_property: Option<String>,
    /// Only features overlapping the bbox of any of these sketches. Used by
    /// internal datasources in place of `bbox`.
    pub sketch: Option<SketchInput>,
}

/// Features of `datasource` read from `url`.
///
/// A filter or bbox configured on the datasource wins over the one in
/// `options`. The property filter is applied after loading.
pub async fn get_datasource_features(
    registry: &DatasourceRegistry,
    datasource: &VectorDatasource,
    url: &str,
    options: &GetDatasourceFeaturesOptions,
) -> Result<Vec<Feature>> {
    let config = datasource.config();
    let property_filter = config.property_filter.as_ref().or(options.property_filter.as_ref());
    let bbox = config.bbox_filter.or(options.bbox);
    let union_property = options.union_property.as_deref().or(config.union_property.as_deref());
    let remote = registry.remote().as_ref();

    let features = match datasource {
        VectorDatasource::Internal(_) => match &options.sketch {
            Some(sketch) => get_features_for_sketch_bboxes(remote, sketch, url, None).await?,
            None => load_fgb(remote, url, bbox.as_ref()).await?,
        },
        VectorDatasource::ExternalSubdivided(config) => {
            let Some(bbox) = bbox else {
                return Err(Error::Validation(format!(
                    "bbox option expected for external datasource {}", config.datasource_id
                )));
            };
            let cache = registry.get(url);
            match union_property {
                Some(property) => cache.fetch_union(&bbox, Some(property)).await?.features,
                None => cache.fetch(&bbox).await?.into_iter().map(Arc::unwrap_or_clone).collect(),
            }
        }
        VectorDatasource::ExternalFlatGeobuf(_) => load_fgb(remote, url, bbox.as_ref()).await?,
    };

    let features = match property_filter {
        Some(filter) => features.into_iter().filter(|f| filter.matches(f)).collect(),
        None => features,
    };
    debug!(datasource = datasource.datasource_id(), url, count = features.len(), "datasource features loaded");
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fgb::tests::write_fgb;
    use crate::io::write_to_geojson_bytes;
    use crate::source::{BundleIndex, GeoJsonDecoder, MemSource};
    use crate::types::Sketch;
    use geo::{polygon, MultiPolygon};
    use serde_json::json;

    fn square(x: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0)
        ]])
    }

    fn registry_with(source: MemSource) -> DatasourceRegistry {
        DatasourceRegistry::new(Arc::new(source), Arc::new(GeoJsonDecoder))
    }

    #[test]
    fn resolves_records_into_variants() {
        let doc = json!([
            { "datasourceId": "eez", "geo_type": "vector", "formats": ["fgb", "subdivided"], "url": "https://h/eez" },
            { "datasourceId": "reefs", "geo_type": "vector", "formats": ["fgb"], "url": "https://h/reefs.fgb" },
            { "datasourceId": "kelp", "geo_type": "vector", "formats": ["fgb", "json"],
              "propertyFilter": { "property": "kind", "values": ["giant"] } },
            { "datasourceId": "depth", "geo_type": "raster", "formats": ["tif"] }
        ]);
        let datasources = load_datasources(doc.to_string().as_bytes()).unwrap();

        assert_eq!(datasources.len(), 3);
        assert!(matches!(&datasources[0], VectorDatasource::ExternalSubdivided(c) if c.datasource_id == "eez"));
        assert!(matches!(&datasources[1], VectorDatasource::ExternalFlatGeobuf(_)));
        let VectorDatasource::Internal(kelp) = &datasources[2] else { panic!("expected internal") };
        assert_eq!(kelp.property_filter, Some(VectorPropertyFilter::new("kind", ["giant"])));
    }

    #[test]
    fn vector_record_without_usable_format_is_config_error() {
        let doc = json!([{ "datasourceId": "x", "geo_type": "vector", "formats": ["json"] }]);
        assert!(matches!(load_datasources(doc.to_string().as_bytes()), Err(Error::Config(_))));
        assert!(matches!(load_datasources(b"{"), Err(Error::Config(_))));
    }

    #[test]
    fn property_filter_compares_numbers_by_value() {
        let filter = VectorPropertyFilter::new("zone", [json!(3), json!("b")]);
        let g = square(0.0);
        assert!(filter.matches(&Feature::new(g.clone()).with_property("zone", 3.0)));
        assert!(filter.matches(&Feature::new(g.clone()).with_property("zone", "b")));
        assert!(!filter.matches(&Feature::new(g.clone()).with_property("zone", "3")));
        assert!(!filter.matches(&Feature::new(g)));
    }

    #[tokio::test]
    async fn internal_fgb_filters_by_bbox_or_sketch() {
        let source = MemSource::new();
        source.insert("mem://kelp.fgb", write_fgb(&[square(0.0), square(2.0), square(10.0)]));
        let registry = registry_with(source);
        let datasource = VectorDatasource::Internal(DatasourceConfig {
            datasource_id: "kelp".into(),
            ..Default::default()
        });

        let options = GetDatasourceFeaturesOptions { bbox: Some(BBox::new(0.0, 0.0, 5.0, 1.0)), ..Default::default() };
        let features = get_datasource_features(&registry, &datasource, "mem://kelp.fgb", &options).await.unwrap();
        assert_eq!(features.len(), 2);

        let options = GetDatasourceFeaturesOptions {
            sketch: Some(Sketch::new("s", "S", square(9.5)).into()),
            ..Default::default()
        };
        let features = get_datasource_features(&registry, &datasource, "mem://kelp.fgb", &options).await.unwrap();
        assert_eq!(features.len(), 1);
    }

    #[tokio::test]
    async fn subdivided_requires_bbox_and_reads_through_cache() {
        let source = MemSource::new();
        let bundle = vec![
            Feature::new(square(0.0)).with_property("name", "a"),
            Feature::new(square(1.0)).with_property("name", "a"),
            Feature::new(square(3.0)).with_property("name", "b"),
        ];
        let bbox = bundle.iter().filter_map(Feature::bbox).reduce(|a, b| a.union(&b)).unwrap();
        let index = BundleIndex::encode(&[bbox]).unwrap();
        source.insert("mem://eez/metadata.json", json!({
            "name": "eez",
            "index": { "length": 1, "bytes": index.len(), "location": "/index.fbi", "rootDir": "" }
        }).to_string());
        source.insert("mem://eez/index.fbi", index);
        source.insert("mem://eez/0.json", write_to_geojson_bytes(&bundle).unwrap());
        let registry = registry_with(source);

        let datasource = VectorDatasource::ExternalSubdivided(DatasourceConfig {
            datasource_id: "eez".into(),
            url: Some("mem://eez".into()),
            ..Default::default()
        });
        let err = get_datasource_features(&registry, &datasource, "mem://eez", &Default::default()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let options = GetDatasourceFeaturesOptions { bbox: Some(BBox::new(0.0, 0.0, 5.0, 1.0)), ..Default::default() };
        let pieces = get_datasource_features(&registry, &datasource, "mem://eez", &options).await.unwrap();
        assert_eq!(pieces.len(), 3);

        let options = GetDatasourceFeaturesOptions {
            union_property: Some("name".into()),
            property_filter: Some(VectorPropertyFilter::new("name", ["a"])),
            ..options
        };
        let unioned = get_datasource_features(&registry, &datasource, "mem://eez", &options).await.unwrap();
        assert_eq!(unioned.len(), 1);
        assert_eq!(registry.registered().len(), 1);
    }
}
