use thiserror::Error;

/// Errors returned by vector operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VecMathError {
    #[error("vecmath: dimension mismatch: {a} vs {b}")]
    DimensionMismatch { a: usize, b: usize },

    #[error("vecmath: no vectors to average")]
    EmptyInput,

    #[error("vecmath: malformed embedding: {0}")]
    MalformedEmbedding(String),
}
