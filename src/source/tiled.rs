use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashSet;
use futures::future::{join_all, ready};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::geom::{dissolve, BBox};
use crate::source::cache::{Bundle, BundleCache, BundleId};
use crate::source::decode::{BundleDecoder, FlatGeobufDecoder};
use crate::source::index::BundleIndex;
use crate::source::metadata::Metadata;
use crate::source::options::TiledDataset;
use crate::source::remote::{HttpSource, RemoteSource};
use crate::source::scheduler::{BundleFuture, Priority, RequestScheduler};
use crate::types::{Feature, FeatureCollection};

/// Metadata and bundle index, loaded together on first use.
struct Init {
    metadata: Metadata,
    index: BundleIndex,
}

/// Last `fetch_union` result, the box it covers and the bundles it was
/// built from.
struct DissolvedCache {
    bbox: BBox,
    bundle_ids: AHashSet<BundleId>,
    union_property: Option<String>,
    features: FeatureCollection,
}

struct State {
    cache: BundleCache,
    scheduler: RequestScheduler,
    dissolved: Option<DissolvedCache>,
    /// Bumped by `clear` so results computed across it are not cached.
    generation: u64,
}

struct Inner {
    dataset: TiledDataset,
    remote: Arc<dyn RemoteSource>,
    decoder: Arc<dyn BundleDecoder>,
    init: OnceCell<Init>,
    init_error: Mutex<Option<Error>>,
    state: Mutex<State>,
}

/// Client-side cache over a remote dataset split into spatially binned
/// bundles.
///
/// Resolves bounding boxes to bundles through the dataset's bundle index,
/// loads missing bundles (one in-flight load per bundle, shared by all
/// callers), and keeps the features of the most recently used bundles in an
/// R-tree. Metadata and the index are loaded lazily, so constructing a cache
/// never fails or touches the network.
///
/// Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct TiledVectorCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for TiledVectorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiledVectorCache")
            .field("url", &self.inner.dataset.url())
            .field("options", &self.inner.dataset.options)
            .finish_non_exhaustive()
    }
}

impl TiledVectorCache {
    pub fn new(dataset: TiledDataset, remote: Arc<dyn RemoteSource>, decoder: Arc<dyn BundleDecoder>) -> Self {
        let state = State {
            cache: BundleCache::new(dataset.options.cache_size),
            scheduler: RequestScheduler::new(),
            dissolved: None,
            generation: 0,
        };
        Self {
            inner: Arc::new(Inner {
                dataset,
                remote,
                decoder,
                init: OnceCell::new(),
                init_error: Mutex::new(None),
                state: Mutex::new(state),
            }),
        }
    }

    /// Cache over HTTP with FlatGeobuf bundles.
    pub fn http(dataset: TiledDataset) -> Result<Self> {
        Ok(Self::new(dataset, Arc::new(HttpSource::new()?), Arc::new(FlatGeobufDecoder)))
    }

    #[inline] pub fn dataset(&self) -> &TiledDataset { &self.inner.dataset }

    #[inline] pub fn url(&self) -> &str { self.inner.dataset.url() }

    /// Dataset metadata, once loaded.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.inner.init.get().map(|init| &init.metadata)
    }

    /// Error of the most recent failed metadata or index load, cleared once a
    /// later load succeeds.
    pub fn last_init_error(&self) -> Option<Error> {
        self.inner.init_error.lock().clone()
    }

    /// Ids of resident bundles, ascending.
    pub fn resident_bundles(&self) -> Vec<BundleId> {
        self.inner.state.lock().cache.resident_ids()
    }

    /// Number of features in the feature index.
    pub fn feature_count(&self) -> usize {
        self.inner.state.lock().cache.feature_count()
    }

    /// Number of bundle loads in flight.
    pub fn pending_requests(&self) -> usize {
        self.inner.state.lock().scheduler.len()
    }

    /// Load metadata and the bundle index if not yet loaded.
    pub async fn load_metadata(&self) -> Result<&Metadata> {
        Ok(&self.init().await?.metadata)
    }

    async fn init(&self) -> Result<&Init> {
        self.inner.init.get_or_try_init(|| self.load_init()).await
    }

    async fn load_init(&self) -> Result<Init> {
        let loaded = self.try_load_init().await;
        let mut init_error = self.inner.init_error.lock();
        match &loaded {
            Ok(init) => {
                *init_error = None;
                info!(url = self.url(), name = %init.metadata.name, bundles = init.index.len(), "loaded dataset index");
            }
            Err(e) => {
                warn!(url = self.url(), error = %e, "failed to load dataset metadata");
                *init_error = Some(e.clone());
            }
        }
        loaded
    }

    async fn try_load_init(&self) -> Result<Init> {
        let base = self.url();
        let token = CancellationToken::new();

        let metadata_url = format!("{base}/metadata.json");
        let bytes = self.inner.remote.get(&metadata_url, &token).await
            .map_err(|e| Error::DatasourceFetch(format!("Problem fetching manifest from {metadata_url}: {e}")))?;
        let metadata: Metadata = serde_json::from_slice(&bytes)
            .map_err(|e| Error::DatasourceFetch(format!("Problem parsing manifest from {metadata_url}: {e}")))?;

        let index_url = metadata.index_url(base);
        let bytes = self.inner.remote.get(&index_url, &token).await
            .map_err(|e| Error::DatasourceFetch(format!("Problem fetching index data at {index_url}: {e}")))?;
        let index = BundleIndex::from_bytes(&bytes)
            .map_err(|e| Error::DatasourceFetch(format!("Problem parsing index data at {index_url}: {e:#}")))?;

        Ok(Init { metadata, index })
    }

    /// Resident bundle, in-flight load, or a newly started load of `id`.
    fn request(&self, metadata: &Metadata, id: BundleId, priority: Priority) -> BundleFuture {
        let mut state = self.inner.state.lock();
        if let Some(bundle) = state.cache.get(id) {
            return ready(Ok(bundle)).boxed().shared();
        }
        if let Some(future) = state.scheduler.join(id, priority) {
            return future;
        }

        let url = metadata.bundle_url(self.url(), id, self.inner.decoder.extension());
        let seq = state.scheduler.next_seq();
        let token = CancellationToken::new();
        debug!(bundle = id, %url, ?priority, "requesting bundle");

        let handle = tokio::spawn(load_bundle(Arc::clone(&self.inner), id, seq, url, token.clone()));
        let future = async move {
            handle.await.unwrap_or_else(|e| Err(Error::BundleFetch(format!("Load task for bundle {id} failed: {e}"))))
        }.boxed().shared();

        state.scheduler.register(id, seq, priority, token, future.clone());
        future
    }

    /// Wait for speculative loads, logging failures instead of returning them.
    async fn settle(&self, metadata: &Metadata, ids: &[BundleId]) {
        let futures: Vec<_> = ids.iter().map(|&id| self.request(metadata, id, Priority::Low)).collect();
        for (id, result) in ids.iter().zip(join_all(futures).await) {
            match result {
                Err(e) if !e.is_aborted() => warn!(url = self.url(), bundle = id, error = %e, "speculative bundle load failed"),
                _ => {}
            }
        }
    }

    /// Features whose bbox intersects `bbox`.
    ///
    /// Loads every bundle the index places in `bbox` (up to `cache_size` of
    /// them) at high priority, cancelling low priority loads of other bundles.
    /// Fails if the metadata, the index or any required bundle cannot be
    /// loaded, and with [`Error::Aborted`] if `clear` cancels a required load.
    /// Features are ordered by bundle id, then position in the bundle.
    pub async fn fetch(&self, bbox: &BBox) -> Result<Vec<Arc<Feature>>> {
        let init = self.init().await?;
        let mut ids = init.index.search(bbox);
        self.inner.state.lock().scheduler.cancel_low_priority_except(&ids);

        let limit = self.inner.dataset.options.cache_size.max(1);
        if ids.len() > limit {
            warn!(url = self.url(), bundles = ids.len(), limit, "fetch needs more bundles than the cache holds");
            ids.truncate(limit);
        }

        let started = Instant::now();
        let futures: Vec<_> = ids.iter().map(|&id| self.request(&init.metadata, id, Priority::High)).collect();
        let bundles = join_all(futures).await.into_iter().collect::<Result<Vec<_>>>()?;
        info!(url = self.url(), bundles = bundles.len(), elapsed_ms = started.elapsed().as_millis() as u64, "fetched bundles");

        Ok(self.features_within(bbox, &bundles))
    }

    /// Index query for `bbox`, plus features of required `bundles` evicted by
    /// concurrent loads in the meantime.
    fn features_within(&self, bbox: &BBox, bundles: &[Arc<Bundle>]) -> Vec<Arc<Feature>> {
        let state = self.inner.state.lock();
        let mut found = state.cache.query(bbox);
        for bundle in bundles.iter().filter(|b| !state.cache.contains(b.id())) {
            found.extend(bundle.features().iter()
                .enumerate()
                .map(|(idx, feature)| (bundle.id(), idx, Arc::clone(feature))));
        }
        drop(state);

        found.sort_unstable_by_key(|(bundle, idx, _)| (*bundle, *idx));
        // Bundles are not perfectly packed along tile edges
        found.into_iter()
            .filter(|(_, _, feature)| feature.bbox.is_some_and(|b| b.intersects(bbox)))
            .map(|(_, _, feature)| feature)
            .collect()
    }

    /// `fetch` over the bbox of `feature`; nothing for features without geometry.
    pub async fn fetch_overlapping(&self, feature: &Feature) -> Result<Vec<Arc<Feature>>> {
        match feature.bbox() {
            Some(bbox) => self.fetch(&bbox).await,
            None => Ok(Vec::new()),
        }
    }

    /// Warm the cache for `bbox` in the background.
    ///
    /// Cancels low priority loads of other bundles, then loads the bundles for
    /// `bbox` only if there are at most `hint_prefetch_limit` of them. Never
    /// fails: errors are logged.
    pub async fn hint(&self, bbox: &BBox) {
        let init = match self.init().await {
            Ok(init) => init,
            Err(e) => {
                warn!(url = self.url(), error = %e, "hint skipped");
                return;
            }
        };
        let ids = init.index.search(bbox);
        self.inner.state.lock().scheduler.cancel_low_priority_except(&ids);

        let limit = self.inner.dataset.options.hint_prefetch_limit;
        if ids.len() > limit {
            debug!(url = self.url(), bundles = ids.len(), limit, "hint covers too many bundles, skipping");
            return;
        }
        self.settle(&init.metadata, &ids).await;
    }

    /// Load up to `cache_size` bundles for `bbox` at low priority, starting
    /// with bundles under `feature` when given. Never fails: errors are
    /// logged.
    pub async fn prefetch(&self, bbox: &BBox, feature: Option<&Feature>) {
        let init = match self.init().await {
            Ok(init) => init,
            Err(e) => {
                warn!(url = self.url(), error = %e, "prefetch skipped");
                return;
            }
        };

        let mut ids = init.index.search(bbox);
        if let Some(feature_bbox) = feature.and_then(Feature::bbox) {
            let mut ordered = init.index.search(&feature_bbox);
            let rest: Vec<_> = ids.into_iter().filter(|id| !ordered.contains(id)).collect();
            ordered.extend(rest);
            ids = ordered;
        }
        self.inner.state.lock().scheduler.cancel_low_priority_except(&ids);

        ids.truncate(self.inner.dataset.options.cache_size.max(1));
        self.settle(&init.metadata, &ids).await;
    }

    /// `fetch`, then merge subdivided fragments back into whole features.
    ///
    /// Fragments sharing `union_property` are merged when given; otherwise
    /// touching fragments are. The last result is reused while a later box
    /// lies inside the cached one, needs a subset of its bundles and no more
    /// than `dissolved_feature_cache_excess_limit` extra ones.
    pub async fn fetch_union(&self, bbox: &BBox, union_property: Option<&str>) -> Result<FeatureCollection> {
        let init = self.init().await?;
        let required: AHashSet<BundleId> = init.index.search(bbox).into_iter().collect();

        let generation = {
            let state = self.inner.state.lock();
            if let Some(cached) = &state.dissolved {
                let limit = self.inner.dataset.options.dissolved_feature_cache_excess_limit;
                if cached.union_property.as_deref() == union_property
                    && cached.bbox.contains(bbox)
                    && required.is_subset(&cached.bundle_ids)
                    && cached.bundle_ids.len() - required.len() <= limit
                {
                    debug!(url = self.url(), "reusing dissolved features");
                    let features = cached.features.features.iter()
                        .filter(|f| f.bbox().is_some_and(|b| b.intersects(bbox)))
                        .cloned()
                        .collect::<Vec<_>>();
                    return Ok(FeatureCollection::new(features));
                }
            }
            state.generation
        };

        let features = self.fetch(bbox).await?;
        if features.is_empty() {
            return Ok(FeatureCollection::empty());
        }
        let dissolved = dissolve(&features, union_property);

        let mut state = self.inner.state.lock();
        if state.generation == generation {
            state.dissolved = Some(DissolvedCache {
                bbox: *bbox,
                bundle_ids: required,
                union_property: union_property.map(str::to_string),
                features: dissolved.clone(),
            });
        }
        Ok(dissolved)
    }

    /// Drop all resident bundles and indexed features, and cancel every
    /// pending load regardless of priority.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let cancelled = state.scheduler.cancel_all();
        state.cache.clear();
        state.dissolved = None;
        state.generation += 1;
        debug!(url = self.url(), cancelled, "cleared cache");
    }
}

/// Body of one spawned bundle load. Whatever the outcome, the pending entry is
/// released; a successful load becomes resident even if it was cancelled
/// after the bytes arrived.
async fn load_bundle(
    inner: Arc<Inner>,
    id: BundleId,
    seq: u64,
    url: String,
    token: CancellationToken,
) -> Result<Arc<Bundle>> {
    let loaded = async {
        let bytes = inner.remote.get(&url, &token).await?;
        let features = inner.decoder.decode(&bytes)
            .map_err(|e| Error::BundleFetch(format!("Failed to decode bundle {id} from {url}: {e:#}")))?;
        Ok::<_, Error>(Arc::new(Bundle::new(id, url.clone(), features)))
    }.await;

    let mut state = inner.state.lock();
    state.scheduler.complete(id, seq);
    let bundle = loaded.inspect_err(|e| debug!(bundle = id, error = %e, "bundle load ended without data"))?;
    state.cache.insert(Arc::clone(&bundle));
    debug!(bundle = id, features = bundle.features().len(), "bundle resident");
    Ok(bundle)
}
