//! External collaborators on the request path: the per-session click log and the
//! item embedding index. Both can be backed by a remote service, so every call is
//! async and every failure is reported as a [`StoreError`].

pub mod session;
pub mod vector;

pub use session::{ClickEvent, MemorySessionStore, RedisSessionStore, SessionStore};
pub use vector::{MemoryVectorIndex, QdrantIndex, VectorIndex};

/// Failure talking to a session store or vector index
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
