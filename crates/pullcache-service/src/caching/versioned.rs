use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::error::cancellable;
use super::item::CacheItem;
use super::{Project, PullCacheRequest, PullError, PullResult, ResourceKey};
use crate::config::PullCacheConfig;
use crate::types::{PreviousResults, ResourceId, WorkspaceId};

type ItemMap<T> = moka::sync::Cache<ResourceKey, Arc<CacheItem<T>>>;

/// An item that requests are currently waiting on or holding the lock of.
///
/// While leased, an item is found here even if it was evicted from or removed out of the
/// [`ItemMap`], so that all requests for its resource keep queueing on the same lock.
struct Lease<T: PullCacheRequest> {
    item: Arc<CacheItem<T>>,
    users: usize,
    /// The workspace was removed, the item must not return into the map.
    removed: bool,
}

/// Decides whether the result a client holds for a resource is still valid, and computes new data
/// through its [`PullCacheRequest`] if it is not.
///
/// One instance exists per kind of pull request. Its `unique_key` prefixes all result ids it hands
/// out, see the [module docs](super) for details.
pub struct VersionedPullCache<T: PullCacheRequest> {
    unique_key: Arc<str>,
    request: T,
    items: ItemMap<T>,
    leases: Mutex<FxHashMap<ResourceKey, Lease<T>>>,
    next_result_id: AtomicU64,
}

impl<T: PullCacheRequest> fmt::Debug for VersionedPullCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedPullCache")
            .field("unique_key", &self.unique_key)
            .field("resources", &self.items.entry_count())
            .field("next_result_id", &self.next_result_id)
            .finish_non_exhaustive()
    }
}

impl<T: PullCacheRequest> VersionedPullCache<T> {
    /// Creates an unbounded cache.
    pub fn new(unique_key: impl AsRef<str>, request: T) -> Self {
        Self::from_config(unique_key, &PullCacheConfig::default(), request)
    }

    /// Creates a cache with the capacity and eviction settings from `config`.
    ///
    /// An evicted resource behaves as if it was never requested: its next request reports new
    /// data under a new result id.
    pub fn from_config(unique_key: impl AsRef<str>, config: &PullCacheConfig, request: T) -> Self {
        let unique_key: Arc<str> = unique_key.as_ref().into();

        let mut builder = ItemMap::<T>::builder().name(&unique_key);
        if let Some(max_entries) = config.max_entries {
            builder = builder.max_capacity(max_entries);
        }
        if let Some(max_unused_for) = config.max_unused_for {
            builder = builder.time_to_idle(max_unused_for);
        }

        Self {
            unique_key,
            request,
            items: builder.build(),
            leases: Mutex::default(),
            next_result_id: AtomicU64::new(0),
        }
    }

    /// The namespace of this cache, which prefixes all of its result ids.
    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    pub fn request(&self) -> &T {
        &self.request
    }

    /// The number of resources currently tracked by this cache.
    ///
    /// Also reports the number as the `pull_cache.entries` gauge.
    pub fn entry_count(&self) -> u64 {
        self.items.run_pending_tasks();
        let entries = self.items.entry_count();
        metric!(gauge("pull_cache.entries") = entries, "cache" => &self.unique_key);
        entries
    }

    /// Forgets all resources of a workspace, typically after it was closed.
    ///
    /// Resources with requests in flight are forgotten once the last of these requests finished.
    /// Until then, new requests for them still queue behind the ones in flight.
    pub fn remove_workspace(&self, workspace: &WorkspaceId) {
        let mut leases = self.lock_leases();
        let mut deferred = 0usize;
        for (key, lease) in leases.iter_mut() {
            if key.workspace() == workspace {
                lease.removed = true;
                deferred += 1;
            }
        }

        let mut removed = 0usize;
        for (key, _) in self.items.iter() {
            if key.workspace() == workspace {
                self.items.invalidate(&*key);
                removed += 1;
            }
        }
        drop(leases);
        tracing::debug!(
            cache = %self.unique_key,
            %workspace,
            removed,
            deferred,
            "Removed workspace"
        );
    }

    fn lock_leases(&self) -> MutexGuard<'_, FxHashMap<ResourceKey, Lease<T>>> {
        self.leases.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Gets the item for `key`, creating it if necessary, and keeps it reachable until the
    /// returned guard is dropped.
    fn lease(&self, key: ResourceKey) -> LeasedItem<'_, T> {
        let mut leases = self.lock_leases();
        let lease = leases.entry(key.clone()).or_insert_with(|| Lease {
            item: self
                .items
                .get_with_by_ref(&key, || Arc::new(CacheItem::new())),
            users: 0,
            removed: false,
        });
        lease.users += 1;
        let item = Arc::clone(&lease.item);
        LeasedItem {
            cache: self,
            key,
            item,
        }
    }

    fn release(&self, key: &ResourceKey) {
        let mut leases = self.lock_leases();
        let Some(lease) = leases.get_mut(key) else {
            return;
        };
        lease.users -= 1;
        if lease.users > 0 {
            return;
        }
        if let Some(lease) = leases.remove(key) {
            // Evicted while in use. It was just requested, so it goes back in.
            if !lease.removed && !self.items.contains_key(key) {
                self.items.insert(key.clone(), lease.item);
            }
        }
    }

    /// Mints the next number of a result id, starting at 1.
    pub(super) fn next_result_id(&self) -> u64 {
        self.next_result_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Answers a pull request for `resource`.
    ///
    /// `previous_results` holds the result ids the client already has, keyed by resource. Returns
    /// `None` if the client's result for `resource` is still up to date, or the new result id along
    /// with the newly computed data otherwise.
    ///
    /// Requests for the same resource are serialized. Failures and cancellations are returned as
    /// errors and do not modify the cached state.
    pub async fn get_or_compute_new_data(
        &self,
        previous_results: &PreviousResults,
        resource: &ResourceId,
        project: &Project,
        state: &T::State,
        cancel: &CancellationToken,
    ) -> PullResult<Option<(String, T::Data)>> {
        let key = ResourceKey::new(project.workspace().clone(), resource.clone());
        let span = tracing::debug_span!(
            "pull_cache",
            cache = %self.unique_key,
            workspace = %project.workspace(),
            %resource,
        );

        let result = self
            .compute(key, previous_results, project, state, cancel)
            .instrument(span.clone())
            .await;

        if let Err(err) = &result {
            let _guard = span.enter();
            if err.is_cancelled() {
                tracing::trace!("Pull request cancelled");
            } else {
                tracing::debug!(
                    error = err as &dyn std::error::Error,
                    "Failed to answer pull request"
                );
            }
            metric!(
                counter("pull_cache.error") += 1,
                "cache" => &self.unique_key,
                "error" => err.metrics_tag(),
            );
        }
        result
    }

    async fn compute(
        &self,
        key: ResourceKey,
        previous_results: &PreviousResults,
        project: &Project,
        state: &T::State,
        cancel: &CancellationToken,
    ) -> PullResult<Option<(String, T::Data)>> {
        metric!(counter("pull_cache.access") += 1, "cache" => &self.unique_key);

        let is_fully_loaded = cancellable(cancel, project.status().is_fully_loaded())
            .await?
            .map_err(PullError::WorkspaceStatus)?;
        if !is_fully_loaded {
            metric!(counter("pull_cache.not_fully_loaded") += 1, "cache" => &self.unique_key);
        }

        let previous = previous_results.get(key.resource());
        let leased = self.lease(key);

        leased
            .item
            .update(
                self,
                previous,
                is_fully_loaded,
                state,
                project.language(),
                cancel,
            )
            .await
    }
}

/// An item leased from a [`VersionedPullCache`], released on drop.
struct LeasedItem<'a, T: PullCacheRequest> {
    cache: &'a VersionedPullCache<T>,
    key: ResourceKey,
    item: Arc<CacheItem<T>>,
}

impl<T: PullCacheRequest> Drop for LeasedItem<'_, T> {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}
