use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use pullcache_service::caching::{Checksum, Project, PullCacheRequest, VersionedPullCache};
use pullcache_service::config::Config;
use pullcache_service::types::{PreviousPullResult, ResourceId, WorkspaceId};

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Workload {
    pub concurrency: usize,
    /// Which kind of cache is exercised, and how its resources are named.
    #[serde(default)]
    pub scope: Scope,
    /// Number of distinct resources that are pulled.
    #[serde(default = "default_resources")]
    pub resources: usize,
    /// Probability that a pull is preceded by an edit of its resource.
    #[serde(default)]
    pub edit_ratio: f64,
    /// Probability that a pull is preceded by a fork of the whole workspace.
    #[serde(default)]
    pub fork_ratio: f64,
    /// How long computing the data of a resource takes.
    #[serde(default, with = "humantime_serde")]
    pub compute_latency: Duration,
}

fn default_resources() -> usize {
    100
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Document,
    Workspace,
}

/// The inputs of one resource at the time of a pull.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    generation: u64,
    revision: u64,
}

/// Computes fake diagnostics that only change on every second edit.
#[derive(Debug)]
pub struct SyntheticDiagnostics {
    compute_latency: Duration,
    computations: AtomicUsize,
}

impl SyntheticDiagnostics {
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

impl PullCacheRequest for SyntheticDiagnostics {
    type CheapVersion = u64;
    type ExpensiveVersion = u64;
    type State = Snapshot;
    type Data = Vec<u64>;

    fn compute_cheap_version<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, anyhow::Result<Option<u64>>> {
        future::ok(Some(snapshot.generation)).boxed()
    }

    fn compute_expensive_version<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, anyhow::Result<u64>> {
        future::ok(snapshot.revision).boxed()
    }

    fn compute_data<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, anyhow::Result<Vec<u64>>> {
        async move {
            self.computations.fetch_add(1, Ordering::Relaxed);
            if !self.compute_latency.is_zero() {
                tokio::time::sleep(self.compute_latency).await;
            }
            Ok(vec![snapshot.revision / 2])
        }
        .boxed()
    }

    fn compute_checksum(&self, data: &Vec<u64>, language: &str) -> Checksum {
        let mut builder = Checksum::builder();
        // writing into a hasher cannot fail
        builder.write_language(language).ok();
        builder.write_value(data).ok();
        builder.build()
    }
}

/// A workload ready to be run: a cache, the resources it is asked about, and the result ids a
/// single simulated client holds for them.
pub struct PreparedWorkload {
    pub cache: VersionedPullCache<SyntheticDiagnostics>,
    project: Project,
    edit_ratio: f64,
    fork_ratio: f64,
    generation: AtomicU64,
    resources: Vec<(ResourceId, AtomicU64)>,
    result_ids: Mutex<HashMap<ResourceId, String>>,
}

pub fn prepare_workload(index: usize, config: &Config, workload: &Workload) -> PreparedWorkload {
    let (unique_key, cache_config) = match workload.scope {
        Scope::Document => (format!("DocumentDiagnostics{index}"), &config.caches.document),
        Scope::Workspace => (format!("WorkspaceDiagnostics{index}"), &config.caches.workspace),
    };
    let request = SyntheticDiagnostics {
        compute_latency: workload.compute_latency,
        computations: AtomicUsize::new(0),
    };
    let resources = (0..workload.resources.max(1))
        .map(|i| {
            let resource = match workload.scope {
                Scope::Document => ResourceId::document(format!("file:///workload{index}/{i}.cs")),
                Scope::Workspace => ResourceId::project(format!("workload{index}/project{i}")),
            };
            (resource, AtomicU64::new(0))
        })
        .collect();

    PreparedWorkload {
        cache: VersionedPullCache::from_config(unique_key, cache_config, request),
        project: Project::fully_loaded(WorkspaceId::new(format!("workload{index}")), "C#"),
        edit_ratio: workload.edit_ratio.clamp(0.0, 1.0),
        fork_ratio: workload.fork_ratio.clamp(0.0, 1.0),
        generation: AtomicU64::new(0),
        resources,
        result_ids: Mutex::default(),
    }
}

/// Whether a pull reported new data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Changed,
}

impl PreparedWorkload {
    /// Randomly edits the workspace and picks the resource to pull.
    fn mutate(&self) -> (usize, Snapshot) {
        let mut rng = rand::rng();
        let index = rng.random_range(0..self.resources.len());
        let revision = &self.resources[index].1;

        if rng.random_bool(self.edit_ratio) {
            revision.fetch_add(1, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::Relaxed);
        } else if rng.random_bool(self.fork_ratio) {
            self.generation.fetch_add(1, Ordering::Relaxed);
        }

        let snapshot = Snapshot {
            generation: self.generation.load(Ordering::Relaxed),
            revision: revision.load(Ordering::Relaxed),
        };
        (index, snapshot)
    }

    fn previous_result(&self, resource: &ResourceId) -> Option<PreviousPullResult> {
        let result_ids = self.result_ids.lock().unwrap_or_else(|e| e.into_inner());
        let result_id = result_ids.get(resource)?;
        Some(PreviousPullResult::new(result_id.clone(), resource.clone()))
    }
}

pub async fn process_workload(workload: &PreparedWorkload) -> anyhow::Result<Outcome> {
    let (index, snapshot) = workload.mutate();
    let resource = &workload.resources[index].0;
    let previous_results = PreviousPullResult::index(workload.previous_result(resource));

    let result = workload
        .cache
        .get_or_compute_new_data(
            &previous_results,
            resource,
            &workload.project,
            &snapshot,
            &CancellationToken::new(),
        )
        .await?;

    match result {
        Some((result_id, _data)) => {
            let mut result_ids = workload
                .result_ids
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            result_ids.insert(resource.clone(), result_id);
            Ok(Outcome::Changed)
        }
        None => Ok(Outcome::Unchanged),
    }
}
