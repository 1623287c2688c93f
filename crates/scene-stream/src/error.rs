//! Error types for scene capture

use scene_data::SnapshotError;
use thiserror::Error;

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors that can occur while acquiring or publishing a scene
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Coordinator runtime shut down")]
    Shutdown,
}

impl From<scene_data::DecodeError> for CaptureError {
    fn from(err: scene_data::DecodeError) -> Self {
        CaptureError::Snapshot(SnapshotError::Decode(err))
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Snapshot(SnapshotError::Io(err))
    }
}
