//! Device scene query capability

use crate::config::QuerySettings;
use glam::Mat4;

/// Outcome of an access request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    Denied(String),
}

/// The underlying device API a live source queries.
///
/// Calls may block for as long as the device needs.
pub trait SceneObserver: Send + Sync {
    /// Whether scene queries work on this device at all
    fn is_supported(&self) -> bool {
        true
    }

    fn request_access(&self) -> AccessStatus;

    /// Compute a serialized scene within `radius` meters. `previous` is the
    /// last payload, passed as an incremental hint the device may ignore.
    fn compute_serialized(
        &self,
        settings: &QuerySettings,
        radius: f32,
        previous: Option<&[u8]>,
    ) -> anyhow::Result<Vec<u8>>;

    /// Transform from the scene's origin to the consumer's space, if the
    /// device can report it
    fn origin_transform(&self) -> Option<Mat4> {
        None
    }
}
