use std::sync::Arc;

use ahash::AHashMap;
use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::source::cache::{Bundle, BundleId};

/// Outcome of one bundle load, shared by every waiter.
pub(crate) type BundleFuture = Shared<BoxFuture<'static, Result<Arc<Bundle>>>>;

/// Request priority. Speculative `hint`/`prefetch` loads are low and may be
/// cancelled by later calls; loads needed by `fetch` are high and are only
/// cancelled by `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    High,
}

struct PendingRequest {
    seq: u64,
    future: BundleFuture,
    token: CancellationToken,
    priority: Priority,
}

/// Table of in-flight bundle loads, at most one per bundle id.
#[derive(Default)]
pub(crate) struct RequestScheduler {
    pending: AHashMap<BundleId, PendingRequest>,
    next_seq: u64,
}

impl RequestScheduler {
    pub(crate) fn new() -> Self { Self::default() }

    /// Join the in-flight load of `id`, raising its priority if needed.
    pub(crate) fn join(&mut self, id: BundleId, priority: Priority) -> Option<BundleFuture> {
        let request = self.pending.get_mut(&id)?;
        if priority > request.priority {
            debug!(bundle = id, "escalated bundle request");
            request.priority = priority;
        }
        debug!(bundle = id, "coalesced bundle request");
        Some(request.future.clone())
    }

    /// Sequence number to hand to the load task before [`Self::register`].
    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub(crate) fn register(
        &mut self,
        id: BundleId,
        seq: u64,
        priority: Priority,
        token: CancellationToken,
        future: BundleFuture,
    ) {
        self.pending.insert(id, PendingRequest { seq, future, token, priority });
    }

    /// Remove the entry for `id` if it still belongs to load `seq`. A
    /// cancelled load may finish after a newer load for the same id started.
    pub(crate) fn complete(&mut self, id: BundleId, seq: u64) -> bool {
        match self.pending.get(&id) {
            Some(request) if request.seq == seq => {
                self.pending.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Cancel and drop every pending load matching `predicate`. Returns the
    /// number cancelled.
    pub(crate) fn cancel_where(&mut self, mut predicate: impl FnMut(BundleId, Priority) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|&id, request| {
            if !predicate(id, request.priority) {
                return true;
            }
            debug!(bundle = id, priority = ?request.priority, "cancelled bundle request");
            request.token.cancel();
            false
        });
        before - self.pending.len()
    }

    /// Cancel low priority loads of bundles outside `keep`.
    pub(crate) fn cancel_low_priority_except(&mut self, keep: &[BundleId]) -> usize {
        self.cancel_where(|id, priority| priority == Priority::Low && !keep.contains(&id))
    }

    pub(crate) fn cancel_all(&mut self) -> usize {
        self.cancel_where(|_, _| true)
    }

    pub(crate) fn priority(&self, id: BundleId) -> Option<Priority> {
        self.pending.get(&id).map(|request| request.priority)
    }

    #[inline] pub(crate) fn len(&self) -> usize { self.pending.len() }
}
