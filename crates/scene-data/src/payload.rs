//! Decoding of the opaque scene payload into a [`Scene`]

use crate::error::DecodeError;
use scene_core::Scene;

/// Turns raw payload bytes into a structured scene.
///
/// Implementations must be deterministic: the same bytes always decode to the
/// same scene, since snapshots cache the first result.
pub trait SceneDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Scene, DecodeError>;
}

/// Payloads serialized as JSON (the format written by [`encode_json_payload`])
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSceneDecoder;

impl SceneDecoder for JsonSceneDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Scene, DecodeError> {
        serde_json::from_slice(payload).map_err(|e| DecodeError(e.to_string()))
    }
}

/// Serialize a scene into a JSON payload
pub fn encode_json_payload(scene: &Scene) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(scene)
}
