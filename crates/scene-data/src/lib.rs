pub mod error;
pub mod payload;
pub mod snapshot;

pub use error::{DecodeError, SnapshotError, SnapshotResult};
pub use payload::{encode_json_payload, JsonSceneDecoder, SceneDecoder};
pub use snapshot::{Snapshot, SnapshotCodec, SnapshotHeader};
