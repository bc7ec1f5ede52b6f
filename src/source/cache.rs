use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use rstar::{RTree, RTreeObject, AABB};
use serde_json::Value;
use tracing::debug;

use crate::geom::BBox;
use crate::types::{Feature, FeatureCollection};

pub type BundleId = usize;

/// Property recording the bundle URL a feature was loaded from.
pub const URL_PROPERTY: &str = "_url";

/// Decoded features of one bundle.
#[derive(Debug)]
pub struct Bundle {
    id: BundleId,
    url: String,
    features: Vec<Arc<Feature>>,
}

impl Bundle {
    /// Features without geometry are dropped; the rest get a bbox and the
    /// `_url` property.
    pub(crate) fn new(id: BundleId, url: String, collection: FeatureCollection) -> Self {
        let features = collection.into_iter()
            .filter_map(|mut feature| {
                feature.ensure_bbox()?;
                feature.properties.insert(URL_PROPERTY.into(), Value::from(url.clone()));
                Some(Arc::new(feature))
            })
            .collect();
        Self { id, url, features }
    }

    #[inline] pub fn id(&self) -> BundleId { self.id }

    #[inline] pub fn url(&self) -> &str { &self.url }

    #[inline] pub fn features(&self) -> &[Arc<Feature>] { &self.features }
}

/// A feature in the feature-level R-tree, tagged with its owning bundle and
/// position in it.
#[derive(Debug, Clone)]
struct IndexedFeature {
    bundle: BundleId,
    idx: usize,
    feature: Arc<Feature>,
    envelope: AABB<[f64; 2]>,
}

impl PartialEq for IndexedFeature {
    fn eq(&self, other: &Self) -> bool {
        self.bundle == other.bundle && self.idx == other.idx && Arc::ptr_eq(&self.feature, &other.feature)
    }
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope { self.envelope }
}

fn indexed(bundle: &Bundle) -> impl Iterator<Item = IndexedFeature> + '_ {
    bundle.features.iter().enumerate().filter_map(|(idx, feature)| {
        feature.bbox.map(|bbox| IndexedFeature {
            bundle: bundle.id,
            idx,
            feature: Arc::clone(feature),
            envelope: bbox.envelope(),
        })
    })
}

/// LRU cache of resident bundles plus an R-tree over exactly their features.
///
/// Both structures are only mutated together: inserting a bundle indexes its
/// features and evicting one unindexes them in the same call.
#[derive(Debug)]
pub(crate) struct BundleCache {
    bundles: LruCache<BundleId, Arc<Bundle>>,
    rtree: RTree<IndexedFeature>,
}

impl BundleCache {
    /// A `capacity` of 0 is treated as 1.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { bundles: LruCache::new(capacity), rtree: RTree::new() }
    }

    #[inline]
    pub(crate) fn contains(&self, id: BundleId) -> bool { self.bundles.contains(&id) }

    /// Resident bundle, marking it most recently used.
    pub(crate) fn get(&mut self, id: BundleId) -> Option<Arc<Bundle>> {
        self.bundles.get(&id).cloned()
    }

    /// Make `bundle` resident, evicting the least recently used bundle when
    /// full. Returns the evicted bundle id. A bundle already resident is only
    /// promoted.
    pub(crate) fn insert(&mut self, bundle: Arc<Bundle>) -> Option<BundleId> {
        if self.bundles.get(&bundle.id).is_some() {
            return None;
        }

        for item in indexed(&bundle) {
            self.rtree.insert(item);
        }
        let (evicted_id, evicted) = self.bundles.push(bundle.id, bundle)?;
        for item in indexed(&evicted) {
            self.rtree.remove(&item);
        }
        debug!(bundle = evicted_id, features = evicted.features.len(), "evicted bundle");
        Some(evicted_id)
    }

    /// Resident features whose bbox intersects `bbox`, ordered by bundle id
    /// then position in the bundle.
    pub(crate) fn query(&self, bbox: &BBox) -> Vec<(BundleId, usize, Arc<Feature>)> {
        let mut found: Vec<_> = self.rtree
            .locate_in_envelope_intersecting(&bbox.envelope())
            .map(|item| (item.bundle, item.idx, Arc::clone(&item.feature)))
            .collect();
        found.sort_unstable_by_key(|(bundle, idx, _)| (*bundle, *idx));
        found
    }

    pub(crate) fn clear(&mut self) {
        self.bundles.clear();
        self.rtree = RTree::new();
    }

    /// Resident bundle ids, ascending.
    pub(crate) fn resident_ids(&self) -> Vec<BundleId> {
        let mut ids: Vec<_> = self.bundles.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    #[inline] pub(crate) fn feature_count(&self) -> usize { self.rtree.size() }

    #[inline] pub(crate) fn len(&self) -> usize { self.bundles.len() }
}
