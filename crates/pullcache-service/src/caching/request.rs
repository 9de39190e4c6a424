use futures::future::{self, BoxFuture, FutureExt};

use super::Checksum;

/// The feature specific part of a pull cache.
///
/// One implementation exists per kind of pull request (document diagnostics, inlay hints, ...).
/// The [`VersionedPullCache`](super::VersionedPullCache) only decides *whether* data needs to be
/// computed, the implementation decides *how*.
pub trait PullCacheRequest: 'static + Send + Sync {
    /// A fast to compute signal of change. It may change although the data did not.
    type CheapVersion: 'static + PartialEq + Send + Sync;

    /// The authoritative version of the inputs the data is computed from.
    type ExpensiveVersion: 'static + PartialEq + Send + Sync;

    /// Everything needed to compute versions and data for one request.
    type State: Send + Sync;

    /// The computed data that is reported to the client.
    type Data: 'static + Send;

    /// Computes the cheap version.
    ///
    /// Returning `None` means there is no cheap version and the expensive version is always
    /// consulted, which is also what the default implementation does.
    fn compute_cheap_version<'a>(
        &'a self,
        state: &'a Self::State,
    ) -> BoxFuture<'a, anyhow::Result<Option<Self::CheapVersion>>> {
        let _ = state;
        future::ok(None).boxed()
    }

    /// Computes the expensive version.
    fn compute_expensive_version<'a>(
        &'a self,
        state: &'a Self::State,
    ) -> BoxFuture<'a, anyhow::Result<Self::ExpensiveVersion>>;

    /// Computes the data reported to the client.
    fn compute_data<'a>(&'a self, state: &'a Self::State)
    -> BoxFuture<'a, anyhow::Result<Self::Data>>;

    /// Computes the checksum of the data, see [`Checksum::builder`].
    ///
    /// Must be deterministic, and must change whenever the data changes in a way the client
    /// would notice.
    fn compute_checksum(&self, data: &Self::Data, language: &str) -> Checksum;
}
