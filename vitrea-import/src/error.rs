//! Error types for vitrea-import

use thiserror::Error;
use vitrea_common::events::ImportSize;

/// Import pipeline error type
#[derive(Debug, Error)]
pub enum ImportError {
    /// Cooperative cancellation observed between plane operations
    #[error("Import cancelled")]
    Cancelled,

    /// Destination pixel set was created with different dimensions than the
    /// source; the transfer aborts before writing anything.
    #[error("Pixel set dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: ImportSize,
        actual: ImportSize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// vitrea-common error (remote store, range checks, tree misuse)
    #[error("Common error: {0}")]
    Common(#[from] vitrea_common::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;
