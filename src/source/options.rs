use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`TiledVectorCache`](crate::TiledVectorCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorDataSourceOptions {
    /// Max resident bundles before least-recently-used eviction.
    pub cache_size: usize,
    /// `hint` only fetches when at most this many bundles are needed.
    pub hint_prefetch_limit: usize,
    /// Extra bundles a cached dissolve result may span and still be reused.
    pub dissolved_feature_cache_excess_limit: usize,
}

impl Default for VectorDataSourceOptions {
    fn default() -> Self {
        Self {
            cache_size: 250,
            hint_prefetch_limit: 8,
            dissolved_feature_cache_excess_limit: 3,
        }
    }
}

/// Handle on a remote tiled dataset: base URL plus cache options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiledDataset {
    url: String,
    pub options: VectorDataSourceOptions,
}

impl TiledDataset {
    /// Trailing slashes are stripped from `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_options(url, VectorDataSourceOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: VectorDataSourceOptions) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self { url, options }
    }

    #[inline] pub fn url(&self) -> &str { &self.url }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_options_fill_defaults() {
        let options: VectorDataSourceOptions = serde_json::from_str(r#"{"cacheSize": 10}"#).unwrap();
        assert_eq!(options.cache_size, 10);
        assert_eq!(options.hint_prefetch_limit, 8);
        assert_eq!(options.dissolved_feature_cache_excess_limit, 3);
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(TiledDataset::new("https://example.com/data/").url(), "https://example.com/data");
        assert_eq!(TiledDataset::new("mem://eez").url(), "mem://eez");
    }
}
