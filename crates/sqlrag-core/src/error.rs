//! Error types for the text-to-SQL pipeline.

use thiserror::Error;

/// Result type alias using SqlRagError.
pub type Result<T> = std::result::Result<T, SqlRagError>;

/// Errors that can occur while indexing or answering a question.
///
/// A failed generated statement is not an error: it is reported as
/// [`crate::Execution::Failed`] so the session can end cleanly.
#[derive(Error, Debug)]
pub enum SqlRagError {
    /// Vector collection not found.
    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    /// Table not present in the source database or the index.
    #[error("Table not found: {name}")]
    TableNotFound { name: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Source database error (connection or metadata extraction).
    #[error("Database error: {message}")]
    Database { message: String },

    /// Vector index storage error.
    #[error("Vector index error: {message}")]
    VectorIndex { message: String },

    /// Embedding service error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Text generation service error.
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SqlRagError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a vector index error.
    pub fn vector_index(message: impl Into<String>) -> Self {
        Self::VectorIndex {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable error code, used in CLI output and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::TableNotFound { .. } => "TABLE_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::VectorIndex { .. } => "VECTOR_INDEX_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether this is the "collection does not exist" outcome.
    pub fn is_collection_not_found(&self) -> bool {
        matches!(self, Self::CollectionNotFound { .. })
    }
}
