use serde::{Deserialize, Serialize};

/// Dataset description served as `{url}/metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Primary bundle index.
    pub index: IndexDescriptor,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composite_indexes: Vec<IndexDescriptor>,
}

/// Location of a bundle index blob and the bundles it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    /// Number of bundles.
    #[serde(default)]
    pub length: usize,
    /// Size of the index blob.
    #[serde(default)]
    pub bytes: usize,
    /// Path of the index blob relative to the dataset URL, e.g. `/index.bin`.
    pub location: String,
    /// Directory of bundle files relative to the dataset URL, e.g. `/bundles`.
    pub root_dir: String,
}

impl Metadata {
    pub(crate) fn index_url(&self, base: &str) -> String {
        format!("{base}{}", self.index.location)
    }

    pub(crate) fn bundle_url(&self, base: &str, id: usize, extension: &str) -> String {
        format!("{base}{}/{id}.{extension}", self.index.root_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metadata_document() {
        let json = r#"{
            "name": "eez",
            "version": 2,
            "index": {"length": 12, "bytes": 1024, "location": "/index.bin", "rootDir": "/bundles"}
        }"#;
        let metadata: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.name, "eez");
        assert_eq!(metadata.index.length, 12);
        assert!(metadata.composite_indexes.is_empty());
        assert_eq!(metadata.index_url("https://host/eez"), "https://host/eez/index.bin");
        assert_eq!(metadata.bundle_url("https://host/eez", 7, "fgb"), "https://host/eez/bundles/7.fgb");
    }

    #[test]
    fn missing_index_is_an_error() {
        assert!(serde_json::from_str::<Metadata>(r#"{"name": "eez"}"#).is_err());
    }
}
