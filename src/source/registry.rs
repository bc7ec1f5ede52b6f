use std::sync::Arc;

use parking_lot::Mutex;

use crate::source::decode::BundleDecoder;
use crate::source::options::{TiledDataset, VectorDataSourceOptions};
use crate::source::remote::RemoteSource;
use crate::source::tiled::TiledVectorCache;

/// Hands out one [`TiledVectorCache`] per dataset URL, all sharing a remote
/// source and bundle decoder.
#[derive(Debug)]
pub struct DatasourceRegistry {
    remote: Arc<dyn RemoteSource>,
    decoder: Arc<dyn BundleDecoder>,
    sources: Mutex<Vec<TiledVectorCache>>,
}

impl DatasourceRegistry {
    pub fn new(remote: Arc<dyn RemoteSource>, decoder: Arc<dyn BundleDecoder>) -> Self {
        Self { remote, decoder, sources: Mutex::new(Vec::new()) }
    }

    /// Remote source shared by every cache, also used for whole-file loads.
    pub fn remote(&self) -> &Arc<dyn RemoteSource> { &self.remote }

    /// Cache for `url` with default options.
    pub fn get(&self, url: &str) -> TiledVectorCache {
        self.get_with_options(url, VectorDataSourceOptions::default())
    }

    /// Cache for `url`, created with `options` on first use. Later calls
    /// return the existing cache and ignore `options`.
    pub fn get_with_options(&self, url: &str, options: VectorDataSourceOptions) -> TiledVectorCache {
        let dataset = TiledDataset::with_options(url, options);
        let mut sources = self.sources.lock();
        if let Some(existing) = sources.iter().find(|s| s.url() == dataset.url()) {
            return existing.clone();
        }
        let cache = TiledVectorCache::new(dataset, Arc::clone(&self.remote), Arc::clone(&self.decoder));
        sources.push(cache.clone());
        cache
    }

    /// Datasets registered so far, in registration order.
    pub fn registered(&self) -> Vec<TiledDataset> {
        self.sources.lock().iter().map(|s| s.dataset().clone()).collect()
    }

    /// Forget all registered caches. Caches already handed out keep working.
    pub fn clear(&self) {
        self.sources.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::decode::GeoJsonDecoder;
    use crate::source::remote::MemSource;

    #[test]
    fn one_cache_per_url() {
        let registry = DatasourceRegistry::new(Arc::new(MemSource::new()), Arc::new(GeoJsonDecoder));
        let options = VectorDataSourceOptions { cache_size: 5, ..Default::default() };

        let a = registry.get_with_options("mem://a/", options);
        let again = registry.get("mem://a");
        registry.get("mem://b");

        assert_eq!(again.dataset().options.cache_size, 5);
        assert_eq!(a.url(), again.url());
        let urls: Vec<_> = registry.registered().iter().map(|d| d.url().to_string()).collect();
        assert_eq!(urls, vec!["mem://a", "mem://b"]);

        registry.clear();
        assert!(registry.registered().is_empty());
    }
}
