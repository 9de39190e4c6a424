//! # Versioned pull caches
//!
//! Editors using the "pull" model of the language server protocol (document and workspace
//! diagnostics, inlay hints, semantic tokens) repeatedly ask for the current data of a resource,
//! passing along the result id of the data they already hold. Answering "unchanged" instead of
//! re-sending the full payload is what keeps this model cheap. This module decides, for every such
//! request, whether the client's result is still valid or whether the data has to be recomputed.
//!
//! ## Layers of change detection
//!
//! A [`VersionedPullCache`] remembers, per [`ResourceKey`], the last result id it handed out
//! together with the versions and the [`Checksum`] of the data it was computed from. A request is
//! then checked against progressively more expensive signals:
//!
//! - The *cheap version* ([`PullCacheRequest::compute_cheap_version`]), for example a solution
//!   generation counter. It may change although nothing relevant to the resource changed, but if
//!   it did not change, nothing did.
//! - The *expensive version* ([`PullCacheRequest::compute_expensive_version`]), for example a
//!   checksum of all inputs of the resource. It is authoritative: if it matches, the data is not
//!   recomputed at all.
//! - The [`Checksum`] of the freshly computed data. Even if the inputs changed, the output might
//!   not have (a whitespace edit does not change the diagnostics of a document). In that case the
//!   client keeps its result id and is told "unchanged".
//!
//! Only if the client's result id matches the one we last reported for the resource can any of
//! these layers answer "unchanged". Unknown, stale or missing result ids always lead to fresh data
//! under a newly minted result id.
//!
//! While a workspace is still loading ([`WorkspaceStatus::is_fully_loaded`]), versions cannot be
//! trusted as the data they were computed from may have been incomplete, so both version checks
//! are skipped. The checksum layer still applies.
//!
//! ## Result ids
//!
//! Result ids have the form `{unique_key}:{n}`, where `unique_key` is the namespace of one cache
//! instance and `n` comes from a counter shared by all resources of that cache. Different kinds of
//! pull requests use different caches with different namespaces, so a result id reported for one
//! kind of request can never be mistaken for one of another kind.
//!
//! ## Concurrency
//!
//! Every resource key owns its own cache item behind an async mutex, which is held for the
//! whole duration of a request, including the calls to the collaborator. Concurrent requests for
//! the same resource are thus answered one after the other, each one observing the state written
//! by its predecessor. Requests for different resources never wait on each other. The map from
//! keys to items is a [`moka`] cache, which gives us lock-free get-or-insert.
//!
//! Items that requests are queued on are leased. A leased item survives eviction and workspace
//! removal until its last request finished, so a resource never has two locks at once.
//!
//! ## Metrics
//!
//! All metrics are tagged with a `cache` field holding the namespace of the cache.
//!
//! - `pull_cache.access`: All requests.
//! - `pull_cache.not_fully_loaded`: Requests answered while the workspace was still loading.
//! - `pull_cache.unchanged`: Requests answered with "unchanged", tagged with the `reason`
//!   (`cheap_version`, `expensive_version` or `checksum`).
//! - `pull_cache.computation`: Actual computations of data.
//! - `pull_cache.compute_data.duration`: A timer for these computations.
//! - `pull_cache.new_result`: Newly minted result ids.
//! - `pull_cache.error`: Failed requests, tagged with the `error` kind.
//! - `pull_cache.entries`: A gauge of the tracked resources, reported by
//!   [`VersionedPullCache::entry_count`].
//!
//! ## Configuration
//!
//! Caches are unbounded by default, a resource entry is only discarded together with its
//! workspace ([`VersionedPullCache::remove_workspace`]). [`PullCacheConfig`] can bound the
//! number of entries and evict entries that were not requested for some time.
//!
//! [`PullCacheConfig`]: crate::config::PullCacheConfig

mod checksum;
mod error;
mod item;
mod request;
mod resource_key;
mod versioned;
mod workspace;


pub use checksum::{Checksum, ChecksumBuilder};
pub use error::{PullError, PullResult};
pub use request::PullCacheRequest;
pub use resource_key::ResourceKey;
pub use versioned::VersionedPullCache;
pub use workspace::{FullyLoaded, Project, WorkspaceLoadState, WorkspaceStatus};
