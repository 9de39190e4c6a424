//! Identities of the resources that pull requests are answered for.
//!
//! These types form the vocabulary shared between the embedding protocol layer and the pull
//! caches: which workspace a request belongs to, which document or project it asks about, and
//! which result the client claims to already hold.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Identity of a loaded workspace.
///
/// Resources with equal [`ResourceId`]s in different workspaces are tracked independently.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, Ord, PartialEq, PartialOrd, Hash)]
#[serde(transparent)]
pub struct WorkspaceId(Arc<str>);

impl WorkspaceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkspaceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The document or project a pull request asks about.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, Ord, PartialEq, PartialOrd, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ResourceId {
    /// A single document, identified by its URI.
    Document(Arc<str>),
    /// A whole project, used by workspace-wide pull requests.
    Project(Arc<str>),
}

impl ResourceId {
    pub fn document(uri: impl AsRef<str>) -> Self {
        Self::Document(uri.as_ref().into())
    }

    pub fn project(id: impl AsRef<str>) -> Self {
        Self::Project(id.as_ref().into())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Document(uri) => write!(f, "document:{uri}"),
            ResourceId::Project(id) => write!(f, "project:{id}"),
        }
    }
}

/// The result a client reported to hold for a resource.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct PreviousPullResult {
    /// The result id the client received the last time it pulled this resource.
    pub previous_result_id: String,
    /// The resource the result was reported for.
    pub resource: ResourceId,
}

/// The results a client claims to hold, indexed by resource.
pub type PreviousResults = FxHashMap<ResourceId, PreviousPullResult>;

impl PreviousPullResult {
    pub fn new(previous_result_id: impl Into<String>, resource: ResourceId) -> Self {
        Self {
            previous_result_id: previous_result_id.into(),
            resource,
        }
    }

    /// Indexes the previous results of a request by their resource.
    ///
    /// When a client reports the same resource more than once, the last report wins.
    pub fn index(results: impl IntoIterator<Item = Self>) -> PreviousResults {
        results
            .into_iter()
            .map(|result| (result.resource.clone(), result))
            .collect()
    }
}
