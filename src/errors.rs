use thiserror::Error;

/// Typed error hierarchy for the pipeline.
///
/// Used at task and client boundaries; leaf code stays on `anyhow::Result`
/// and converts through the `Internal` variant via `?`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A store query or write failed. The current task aborts with no
    /// partial effects and is safe to resubmit.
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    /// A report or lookup request failed. No store mutation happened;
    /// retry is caller-driven.
    #[error("network error: {0}")]
    Network(#[source] anyhow::Error),

    /// A candidate payload could not be parsed into a message value.
    /// Only that candidate is dropped from its batch.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The task was cancelled cooperatively before committing.
    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
