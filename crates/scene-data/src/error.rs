//! Error types for snapshot decoding

use thiserror::Error;

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// The opaque payload could not be turned into a structured scene
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Scene decode failed: {0}")]
pub struct DecodeError(pub String);

/// Errors that can occur while reading or writing a snapshot
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Malformed snapshot: {0}")]
    Malformed(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
