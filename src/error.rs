use std::thread::ThreadId;
use thiserror::Error;

/// Errors reported by a [`ViewGraph`](crate::ViewGraph).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewGraphError {
    /// Outputs may only be updated on the thread that created the view graph.
    #[error("view graph updated on {actual:?}, but it belongs to {expected:?}")]
    NotOnUpdateThread { expected: ThreadId, actual: ThreadId },
    #[error("view graph was invalidated")]
    Invalidated,
    #[error("layout output was not requested")]
    MissingLayoutOutput,
}
