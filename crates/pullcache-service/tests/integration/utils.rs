use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use pullcache_service::caching::{Checksum, Project, PullCacheRequest, VersionedPullCache};
use pullcache_service::types::{PreviousPullResult, ResourceId};

/// An immutable snapshot of all documents, like a compiler's solution.
///
/// Every change produces a new snapshot with a higher generation.
#[derive(Debug, Clone, Default)]
pub struct Solution {
    generation: u64,
    documents: BTreeMap<String, Arc<str>>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(&self, uri: &str, text: &str) -> Self {
        let mut documents = self.documents.clone();
        documents.insert(uri.to_owned(), text.into());
        Self {
            generation: self.generation + 1,
            documents,
        }
    }

    /// A new snapshot without any changes, as produced by a project reload.
    pub fn fork(&self) -> Self {
        Self {
            generation: self.generation + 1,
            documents: self.documents.clone(),
        }
    }

    pub fn document(&self, uri: &str) -> Document {
        Document {
            generation: self.generation,
            uri: uri.to_owned(),
            text: self.documents.get(uri).cloned().unwrap_or_else(|| "".into()),
        }
    }
}

/// A single document within a [`Solution`].
#[derive(Debug, Clone)]
pub struct Document {
    generation: u64,
    uri: String,
    text: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub uri: String,
    pub line: usize,
    pub message: String,
}

/// The diagnostics of a document, as computed by [`DocumentDiagnostics`].
pub fn diagnostics(document: &Document) -> Vec<Diagnostic> {
    diagnose(&document.uri, &document.text)
}

/// Every line mentioning an error is one.
fn diagnose(uri: &str, text: &str) -> Vec<Diagnostic> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.contains("error"))
        .map(|(line, text)| Diagnostic {
            uri: uri.to_owned(),
            line,
            message: text.trim().to_owned(),
        })
        .collect()
}

fn diagnostics_checksum(diagnostics: &[Diagnostic], language: &str) -> Checksum {
    let mut builder = Checksum::builder();
    builder.write_language(language).unwrap();
    builder.write_value(diagnostics).unwrap();
    builder.build()
}

/// Diagnostics of a single document.
#[derive(Debug, Default)]
pub struct DocumentDiagnostics {
    computations: AtomicUsize,
}

impl DocumentDiagnostics {
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }
}

impl PullCacheRequest for DocumentDiagnostics {
    type CheapVersion = u64;
    type ExpensiveVersion = Checksum;
    type State = Document;
    type Data = Vec<Diagnostic>;

    fn compute_cheap_version<'a>(
        &'a self,
        document: &'a Document,
    ) -> BoxFuture<'a, anyhow::Result<Option<u64>>> {
        future::ok(Some(document.generation)).boxed()
    }

    fn compute_expensive_version<'a>(
        &'a self,
        document: &'a Document,
    ) -> BoxFuture<'a, anyhow::Result<Checksum>> {
        future::ok(Checksum::of_bytes(document.text.as_bytes())).boxed()
    }

    fn compute_data<'a>(
        &'a self,
        document: &'a Document,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Diagnostic>>> {
        async move {
            self.computations.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(diagnostics(document))
        }
        .boxed()
    }

    fn compute_checksum(&self, data: &Vec<Diagnostic>, language: &str) -> Checksum {
        diagnostics_checksum(data, language)
    }
}

/// Diagnostics of all documents of a solution.
#[derive(Debug, Default)]
pub struct WorkspaceDiagnostics {
    computations: AtomicUsize,
}

impl WorkspaceDiagnostics {
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }
}

impl PullCacheRequest for WorkspaceDiagnostics {
    type CheapVersion = u64;
    type ExpensiveVersion = Checksum;
    type State = Solution;
    type Data = Vec<Diagnostic>;

    fn compute_cheap_version<'a>(
        &'a self,
        solution: &'a Solution,
    ) -> BoxFuture<'a, anyhow::Result<Option<u64>>> {
        future::ok(Some(solution.generation)).boxed()
    }

    fn compute_expensive_version<'a>(
        &'a self,
        solution: &'a Solution,
    ) -> BoxFuture<'a, anyhow::Result<Checksum>> {
        let mut builder = Checksum::builder();
        for (uri, text) in &solution.documents {
            builder.update(uri);
            builder.update(text.as_bytes());
        }
        future::ok(builder.build()).boxed()
    }

    fn compute_data<'a>(
        &'a self,
        solution: &'a Solution,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Diagnostic>>> {
        async move {
            self.computations.fetch_add(1, Ordering::SeqCst);
            let diagnostics = solution
                .documents
                .iter()
                .flat_map(|(uri, text)| diagnose(uri, text))
                .collect();
            Ok(diagnostics)
        }
        .boxed()
    }

    fn compute_checksum(&self, data: &Vec<Diagnostic>, language: &str) -> Checksum {
        diagnostics_checksum(data, language)
    }
}

/// An editor that remembers the result ids it was handed.
#[derive(Debug, Default)]
pub struct Client {
    result_ids: HashMap<ResourceId, String>,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result_id(&self, resource: &ResourceId) -> Option<&str> {
        self.result_ids.get(resource).map(String::as_str)
    }

    /// Pulls `resource`, returning the data if it changed since the last pull.
    pub async fn pull<T: PullCacheRequest>(
        &mut self,
        cache: &VersionedPullCache<T>,
        resource: &ResourceId,
        project: &Project,
        state: &T::State,
    ) -> Option<T::Data> {
        let previous_results = PreviousPullResult::index(
            self.result_ids
                .get(resource)
                .map(|result_id| PreviousPullResult::new(result_id.clone(), resource.clone())),
        );
        let result = cache
            .get_or_compute_new_data(
                &previous_results,
                resource,
                project,
                state,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let (result_id, data) = result?;
        self.result_ids.insert(resource.clone(), result_id);
        Some(data)
    }
}
