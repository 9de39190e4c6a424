use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::cancellable;
use super::{Checksum, PullCacheRequest, PullError, PullResult, VersionedPullCache};
use crate::types::PreviousPullResult;

/// The last result reported for a resource.
enum LastResult<C, E> {
    /// Nothing was reported yet.
    Absent,
    /// `result_id` was handed out for data with the given checksum, computed at these versions.
    Present {
        result_id: String,
        cheap_version: Option<C>,
        expensive_version: E,
        checksum: Checksum,
    },
}

type LastResultOf<T> =
    LastResult<<T as PullCacheRequest>::CheapVersion, <T as PullCacheRequest>::ExpensiveVersion>;

/// The state of a single resource in a [`VersionedPullCache`].
///
/// The lock around the last result is held for the full duration of [`CacheItem::update`], so
/// requests for the same resource are answered strictly one after the other.
pub(super) struct CacheItem<T: PullCacheRequest> {
    last_result: Mutex<LastResultOf<T>>,
}

impl<T: PullCacheRequest> CacheItem<T> {
    pub fn new() -> Self {
        Self {
            last_result: Mutex::new(LastResult::Absent),
        }
    }

    /// Answers a pull request for this item's resource.
    ///
    /// Returns `None` if the result the client holds according to `previous` is still up to date,
    /// otherwise the newly computed data along with its freshly minted result id.
    ///
    /// The stored state is only replaced after all computations finished, so a cancelled or
    /// failed request leaves it untouched.
    pub async fn update(
        &self,
        cache: &VersionedPullCache<T>,
        previous: Option<&PreviousPullResult>,
        is_fully_loaded: bool,
        state: &T::State,
        language: &str,
        cancel: &CancellationToken,
    ) -> PullResult<Option<(String, T::Data)>> {
        let name = cache.unique_key();
        let request = cache.request();
        let previous_result_id = previous.map(|previous| previous.previous_result_id.as_str());

        let mut last_result = cancellable(cancel, self.last_result.lock()).await?;

        // Versions computed while checking the client's result are reused when recording the new
        // state, so every version is computed at most once per request.
        let mut cheap_version = None;
        let mut expensive_version = None;

        if let LastResult::Present {
            result_id,
            cheap_version: last_cheap_version,
            expensive_version: last_expensive_version,
            ..
        } = &*last_result
        {
            if is_fully_loaded && previous_result_id == Some(result_id.as_str()) {
                let cheap = cancellable(cancel, request.compute_cheap_version(state))
                    .await?
                    .map_err(PullError::Version)?;
                if cheap.is_some() && cheap == *last_cheap_version {
                    tracing::trace!(%result_id, "Cheap version unchanged");
                    metric!(
                        counter("pull_cache.unchanged") += 1,
                        "reason" => "cheap_version",
                        "cache" => name,
                    );
                    return Ok(None);
                }

                // The cheap version may have changed for reasons unrelated to this resource, like
                // a forked or reloaded project. Ask the authoritative version instead.
                let expensive = cancellable(cancel, request.compute_expensive_version(state))
                    .await?
                    .map_err(PullError::Version)?;
                if expensive == *last_expensive_version {
                    tracing::trace!(%result_id, "Expensive version unchanged");
                    metric!(
                        counter("pull_cache.unchanged") += 1,
                        "reason" => "expensive_version",
                        "cache" => name,
                    );
                    return Ok(None);
                }

                cheap_version = Some(cheap);
                expensive_version = Some(expensive);
            }
        }

        let cheap_version = match cheap_version {
            Some(cheap_version) => cheap_version,
            None => cancellable(cancel, request.compute_cheap_version(state))
                .await?
                .map_err(PullError::Version)?,
        };
        let expensive_version = match expensive_version {
            Some(expensive_version) => expensive_version,
            None => cancellable(cancel, request.compute_expensive_version(state))
                .await?
                .map_err(PullError::Version)?,
        };

        metric!(counter("pull_cache.computation") += 1, "cache" => name);
        let start = Instant::now();
        let data = cancellable(cancel, request.compute_data(state))
            .await?
            .map_err(PullError::Data)?;
        metric!(timer("pull_cache.compute_data.duration") = start.elapsed(), "cache" => name);

        let checksum = request.compute_checksum(&data, language);

        if let LastResult::Present {
            result_id,
            checksum: last_checksum,
            ..
        } = &*last_result
        {
            if previous_result_id == Some(result_id.as_str()) && *last_checksum == checksum {
                // The client already holds this exact data. Keep its result id, but remember the
                // new versions so that the next request can be answered without computing data.
                tracing::trace!(%result_id, "Data checksum unchanged");
                metric!(
                    counter("pull_cache.unchanged") += 1,
                    "reason" => "checksum",
                    "cache" => name,
                );
                let result_id = result_id.clone();
                *last_result = LastResult::Present {
                    result_id,
                    cheap_version,
                    expensive_version,
                    checksum,
                };
                return Ok(None);
            }
        }

        let result_id = format!("{name}:{}", cache.next_result_id());
        tracing::trace!(%result_id, ?previous_result_id, "Reporting new result");
        metric!(counter("pull_cache.new_result") += 1, "cache" => name);

        *last_result = LastResult::Present {
            result_id: result_id.clone(),
            cheap_version,
            expensive_version,
            checksum,
        };
        Ok(Some((result_id, data)))
    }
}
