//! Common error types for Vitrea

use thiserror::Error;

/// Common result type for Vitrea operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Vitrea crates
#[derive(Error, Debug)]
pub enum Error {
    /// Detail accessor called on an entity that is only a reference.
    /// Recoverable: re-fetch the entity from the remote store.
    #[error("Entity not loaded: {0}")]
    NotLoaded(String),

    /// Mutation of a field that is immutable once the entity is persisted
    #[error("Field is immutable after creation: {0}")]
    ImmutableField(&'static str),

    /// Tree operation given a node id that is not in the tree
    #[error("No such node in the hierarchy tree")]
    NullNode,

    /// Traversal requested with an unknown algorithm selector
    #[error("Unsupported traversal algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Pixel coordinate outside the pixel set bounds
    #[error("{axis} out of range [0, {limit}): {value}")]
    OutOfRange {
        axis: &'static str,
        value: i64,
        limit: i64,
    },

    /// Remote store failure, surfaced as-is
    #[error("Remote store error: {0}")]
    Remote(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Range check helper for pixel coordinates
    pub fn check_range(axis: &'static str, value: i64, limit: i64) -> Result<()> {
        if value < 0 || value >= limit {
            return Err(Error::OutOfRange { axis, value, limit });
        }
        Ok(())
    }
}
