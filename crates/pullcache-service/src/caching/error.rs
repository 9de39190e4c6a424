use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// An error that happens while answering a pull request.
///
/// None of these errors are persisted: a failed request leaves the cached state of its resource
/// untouched, and the next request for it starts from the last successfully reported result.
#[derive(Debug, Error)]
pub enum PullError {
    /// The request was cancelled by its caller.
    #[error("pull request was cancelled")]
    Cancelled,
    /// Asking whether the workspace is fully loaded failed.
    #[error("failed to query the workspace status")]
    WorkspaceStatus(#[source] anyhow::Error),
    /// Computing either the cheap or the expensive version failed.
    #[error("failed to compute the version")]
    Version(#[source] anyhow::Error),
    /// Computing the data failed.
    #[error("failed to compute the data")]
    Data(#[source] anyhow::Error),
}

impl PullError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn metrics_tag(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::WorkspaceStatus(_) => "workspace_status",
            Self::Version(_) => "version",
            Self::Data(_) => "data",
        }
    }
}

pub type PullResult<T> = Result<T, PullError>;

/// Drives `future` to completion unless `cancel` fires first.
///
/// Cancellation takes precedence if both are ready.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> PullResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PullError::Cancelled),
        output = future => Ok(output),
    }
}
