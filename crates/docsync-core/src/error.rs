use thiserror::Error;

/// Failure classes reported by a backend (cluster client, KV tier, index tier).
///
/// Backends map their native failures onto these variants so the engine can
/// tell a bad target name apart from a transport problem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Scope not found: {0}")]
    ScopeNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Search index not found: {0}")]
    IndexNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected backend response: {0}")]
    Unexpected(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound(_)
                | Self::ScopeNotFound(_)
                | Self::CollectionNotFound(_)
                | Self::IndexNotFound(_)
                | Self::DocumentNotFound(_)
        )
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        source: BackendError,
    },

    #[error("{0}")]
    Timeout(String),

    #[error("Index '{0}' does not exist")]
    IndexNotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Backend failure passed through as-is.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    pub fn connection(source: BackendError) -> Self {
        Self::Connection { message: format!("Failed to connect to cluster: {source}"), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
