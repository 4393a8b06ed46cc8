//! Error types shared by every ragtrace component.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the RAG pipeline and its collaborators.
///
/// A safety suppression is **not** an error; it is reported as
/// [`Generation::Suppressed`](crate::generation::Generation::Suppressed).
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid configuration (chunk parameters, templates, provider settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// A remote provider could not be reached, or kept failing transiently
    /// until the retry budget was exhausted.
    #[error("network error ({provider}): {message}")]
    Network { provider: String, message: String },

    /// A remote provider rejected the credentials.
    #[error("authentication failed ({provider}): {message}")]
    Auth { provider: String, message: String },

    /// A local model could not be loaded.
    #[error("failed to load model '{model}': {message}")]
    ModelLoad { model: String, message: String },

    /// A provider answered, but with a non-retryable error or a malformed body.
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// A source document could not be loaded.
    #[error("failed to load '{source_id}': {message}")]
    Load { source_id: String, message: String },

    /// A vector's dimensionality differs from the store's.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A pipeline stage exceeded its deadline.
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: String, after: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Shorthand for [`RagError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        RagError::Config(message.into())
    }

    /// True for [`RagError::ModelLoad`], the only failure that may trigger a
    /// local-model fallback.
    pub fn is_model_load(&self) -> bool {
        matches!(self, RagError::ModelLoad { .. })
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, RagError>;
