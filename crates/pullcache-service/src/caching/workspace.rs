use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::watch;

use crate::types::WorkspaceId;

/// Tells whether a workspace finished loading.
///
/// Results computed while a workspace is still loading may be based on incomplete inputs, so
/// their versions are not trusted.
pub trait WorkspaceStatus: Send + Sync {
    fn is_fully_loaded(&self) -> BoxFuture<'_, anyhow::Result<bool>>;
}

/// A [`WorkspaceStatus`] for workspaces that are always fully loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullyLoaded;

impl WorkspaceStatus for FullyLoaded {
    fn is_fully_loaded(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        future::ok(true).boxed()
    }
}

/// A [`WorkspaceStatus`] flag that is flipped by whoever loads the workspace.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct WorkspaceLoadState {
    loaded: Arc<watch::Sender<bool>>,
}

impl WorkspaceLoadState {
    /// Creates the state of a workspace that is still loading.
    pub fn loading() -> Self {
        Self::with_status(false)
    }

    /// Creates the state of a workspace that is fully loaded.
    pub fn loaded() -> Self {
        Self::with_status(true)
    }

    fn with_status(loaded: bool) -> Self {
        let (sender, _) = watch::channel(loaded);
        Self {
            loaded: Arc::new(sender),
        }
    }

    pub fn set_fully_loaded(&self, loaded: bool) {
        let previous = self.loaded.send_replace(loaded);
        if previous != loaded {
            tracing::debug!(loaded, "Workspace load state changed");
        }
    }

    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    /// Waits until the workspace is marked as fully loaded.
    pub async fn wait_until_loaded(&self) {
        let mut receiver = self.loaded.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = receiver.wait_for(|loaded| *loaded).await;
    }
}

impl WorkspaceStatus for WorkspaceLoadState {
    fn is_fully_loaded(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        future::ok(self.is_loaded()).boxed()
    }
}

/// The project context of a pull request.
///
/// Names the workspace the requested resource lives in, the language its data is computed for,
/// and where to ask whether that workspace is fully loaded.
#[derive(Clone)]
pub struct Project {
    workspace: WorkspaceId,
    language: Arc<str>,
    status: Arc<dyn WorkspaceStatus>,
}

impl Project {
    pub fn new(
        workspace: WorkspaceId,
        language: impl AsRef<str>,
        status: Arc<dyn WorkspaceStatus>,
    ) -> Self {
        Self {
            workspace,
            language: language.as_ref().into(),
            status,
        }
    }

    /// Creates a project context for a workspace that is always fully loaded.
    pub fn fully_loaded(workspace: WorkspaceId, language: impl AsRef<str>) -> Self {
        Self::new(workspace, language, Arc::new(FullyLoaded))
    }

    pub fn workspace(&self) -> &WorkspaceId {
        &self.workspace
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn status(&self) -> &dyn WorkspaceStatus {
        &*self.status
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("workspace", &self.workspace)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}
