//! Listing engine error types.
//!
//! Nothing in the engine surfaces these to the end user: resolvers and
//! builders log them and degrade to a broader result set instead.

use thiserror::Error;

/// Errors raised by the content repository collaborator.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("unknown taxonomy: {0}")]
    UnknownTaxonomy(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Listing engine errors.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("repository error")]
    Repository(#[from] RepositoryError),

    #[error("cache codec error")]
    Codec(#[from] serde_json::Error),

    #[error("cache store error")]
    Store(#[from] redis::RedisError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using ListingError.
pub type ListingResult<T> = Result<T, ListingError>;
