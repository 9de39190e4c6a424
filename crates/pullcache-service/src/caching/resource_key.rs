use std::fmt;

use crate::types::{ResourceId, WorkspaceId};

/// The unit of caching: one resource within one workspace.
///
/// Every key owns an independent entry in a [`VersionedPullCache`](super::VersionedPullCache),
/// including its own lock.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResourceKey {
    workspace: WorkspaceId,
    resource: ResourceId,
}

impl ResourceKey {
    pub fn new(workspace: WorkspaceId, resource: ResourceId) -> Self {
        Self {
            workspace,
            resource,
        }
    }

    pub fn workspace(&self) -> &WorkspaceId {
        &self.workspace
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.resource)
    }
}
