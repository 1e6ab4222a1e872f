//! Error types for the retrieval engine.

use std::time::Duration;

use thiserror::Error;

use crate::record::RecordId;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
///
/// A question with no relevant record is not an error: it is
/// [`MatchResult::NotFound`](crate::MatchResult::NotFound).
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The embedding backend could not be initialized.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// No usable records to build an index from.
    #[error("corpus is empty")]
    EmptyCorpus,

    /// Record and vector counts disagree.
    #[error("size mismatch: {records} records but {vectors} vectors")]
    SizeMismatch { records: usize, vectors: usize },

    /// Vectors of different lengths were mixed.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector refers to a record absent from the store.
    #[error("no record with id {0}")]
    UnknownRecord(RecordId),

    /// Embedding the corpus failed during a build.
    #[error("embedding error: {0}")]
    Embedding(#[from] member_qa_embeddings::EmbeddingError),

    /// Embedding a single question failed.
    #[error("failed to embed question: {0}")]
    QueryEmbeddingFailure(#[source] member_qa_embeddings::EmbeddingError),

    /// An answer did not complete within its deadline.
    #[error("answer timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
