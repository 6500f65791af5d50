//! Top-level error types for Omem.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Add(#[from] AddError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to create data directory {path}: {source}")]
    DataDir {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation id already exists: {id}")]
    DuplicateId { id: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced to callers of [`MemoryService::add`](crate::MemoryService::add).
///
/// Extraction failures are deliberately absent: once the conversation is
/// durably recorded, a failed extraction degrades to zero facts and is
/// logged, not surfaced.
#[derive(Debug, thiserror::Error)]
pub enum AddError {
    #[error("conversation id already exists: {id}")]
    DuplicateId { id: String },

    #[error("invalid conversation: {0}")]
    InvalidConversation(String),

    #[error("conversation has {count} turns, maximum is {max}")]
    TooManyTurns { count: usize, max: usize },

    #[error("turn {seq} content is {size} bytes, maximum is {max}")]
    TurnTooLarge { seq: usize, size: usize, max: usize },

    #[error("failed to persist conversation: {0}")]
    Persist(#[source] StoreError),
}

/// Errors surfaced to callers of [`MemoryService::search`](crate::MemoryService::search).
///
/// An empty result set is not an error; these cover malformed input and
/// backend unavailability only.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("query is {size} bytes, maximum is {max}")]
    QueryTooLong { size: usize, max: usize },

    #[error("search backend failed: {0}")]
    Backend(#[source] StoreError),
}

/// Fact extraction errors. Non-fatal by policy: the service logs these and
/// finishes the add with zero facts.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("conversation has turns but no extractable content")]
    EmptyContent,
}

/// Index consistency errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index references {missing} fact(s) absent from the store")]
    Inconsistency { missing: usize },
}
