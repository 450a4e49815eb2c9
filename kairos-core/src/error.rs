use thiserror::Error;

/// Service-level error taxonomy.
///
/// Business-rule rejections (`Validation`, `Conflict`, `Capacity`,
/// `NotFound`) propagate typed to the API boundary so it can map them to
/// distinct status codes. Infrastructure failures are split between
/// persistence (`Database`, `Pool`), which always propagate, and pub/sub
/// (`PubSub`), which the dispatcher swallows after logging because the
/// persisted row is the durability fallback.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("pub/sub error: {0}")]
    PubSub(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::Capacity(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// True for failures the caller may retry; business-rule rejections are
    /// final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Pool(_) | Error::PubSub(_))
    }
}
