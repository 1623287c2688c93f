//! Framed scene snapshot container
//!
//! Layout (little-endian throughout):
//!
//! ```text
//! [0..4]      magic 0x12345678 (absent: legacy unframed payload)
//! [4..8]      header length L (i32)
//! [8..8+L]    header: version (i32) | has_matrix (u8) | 16 x f32 row-major iff has_matrix
//! [8+L..]     raw scene payload, opaque to this module
//! ```

use crate::error::{DecodeError, SnapshotError, SnapshotResult};
use crate::payload::{JsonSceneDecoder, SceneDecoder};
use glam::Mat4;
use scene_core::{transform, Scene};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Leading magic number of a framed snapshot
pub const SNAPSHOT_MAGIC: i32 = 0x1234_5678;

/// Header format version written by this crate
pub const HEADER_VERSION: i32 = 1;

/// File extension for persisted snapshots
pub const SNAPSHOT_EXTENSION: &str = "suscene";

const MATRIX_FLOATS: usize = 16;
const MATRIX_BYTES: usize = MATRIX_FLOATS * 4;
/// version + has_matrix flag
const HEADER_FIXED_BYTES: usize = 4 + 1;

fn read_i32(bytes: &[u8], offset: usize) -> Option<i32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(i32::from_le_bytes(raw.try_into().ok()?))
}

/// Parsed snapshot header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapshotHeader {
    pub version: i32,
    /// Placement supplied by the source, if any
    pub matrix: Option<Mat4>,
}

impl SnapshotHeader {
    pub fn new(matrix: Option<Mat4>) -> Self {
        Self { version: HEADER_VERSION, matrix }
    }

    /// Parse a header of exactly the declared length
    pub fn parse(header: &[u8]) -> SnapshotResult<Self> {
        let version = read_i32(header, 0).ok_or_else(|| {
            SnapshotError::Malformed(format!("header is {} bytes, too short for a version", header.len()))
        })?;
        if version != HEADER_VERSION {
            return Err(SnapshotError::Malformed(format!("unsupported header version {version}")));
        }

        let has_matrix = match header.get(4) {
            Some(flag) => *flag != 0,
            None => {
                return Err(SnapshotError::Malformed(
                    "header ends before the has-matrix flag".to_string(),
                ))
            }
        };

        if !has_matrix {
            return Ok(Self { version, matrix: None });
        }

        let raw = header
            .get(HEADER_FIXED_BYTES..HEADER_FIXED_BYTES + MATRIX_BYTES)
            .ok_or_else(|| {
                SnapshotError::Malformed(format!(
                    "header declares a matrix but holds only {} bytes",
                    header.len()
                ))
            })?;

        let mut rows = [0.0f32; MATRIX_FLOATS];
        for (value, chunk) in rows.iter_mut().zip(raw.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        // Stored row-major, glam is column-major
        Ok(Self {
            version,
            matrix: Some(Mat4::from_cols_array(&rows).transpose()),
        })
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_FIXED_BYTES + if self.matrix.is_some() { MATRIX_BYTES } else { 0 }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(u8::from(self.matrix.is_some()));
        if let Some(matrix) = self.matrix {
            for value in matrix.transpose().to_cols_array() {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
}

/// One captured scene: raw payload, placement and a lazily decoded scene.
///
/// Immutable once built. The decoded scene is computed at most once; a decode
/// failure is cached the same way as a success.
pub struct Snapshot {
    placement_matrix: Mat4,
    matrix_is_inferred: bool,
    raw_payload: Vec<u8>,
    scene: OnceLock<Result<Scene, DecodeError>>,
    decoder: Arc<dyn SceneDecoder>,
}

impl Snapshot {
    /// Transform from scene-local space into consumer space
    pub fn placement_matrix(&self) -> Mat4 {
        self.placement_matrix
    }

    /// True when the placement was derived from scene content
    pub fn matrix_is_inferred(&self) -> bool {
        self.matrix_is_inferred
    }

    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    /// Decoded scene, decoding the payload on first access
    pub fn scene(&self) -> Result<&Scene, DecodeError> {
        self.scene
            .get_or_init(|| self.decoder.decode(&self.raw_payload))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Whether the payload has been decoded yet
    pub fn is_decoded(&self) -> bool {
        self.scene.get().is_some()
    }

    /// Number of scene objects, if the payload decodes
    pub fn object_count(&self) -> Option<usize> {
        self.scene().ok().map(Scene::object_count)
    }

    /// Header as it will be written by [`SnapshotCodec::encode`]
    pub fn header(&self) -> SnapshotHeader {
        SnapshotHeader::new((!self.matrix_is_inferred).then_some(self.placement_matrix))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        SnapshotCodec::encode(self)
    }

    /// Save the framed encoding to a file
    pub fn save(&self, path: &Path) -> SnapshotResult<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("placement_matrix", &self.placement_matrix)
            .field("matrix_is_inferred", &self.matrix_is_inferred)
            .field("payload_len", &self.raw_payload.len())
            .field("decoded", &self.is_decoded())
            .finish()
    }
}

/// Builds snapshots from bytes or live scenes, and encodes them back
#[derive(Clone)]
pub struct SnapshotCodec {
    decoder: Arc<dyn SceneDecoder>,
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new(Arc::new(JsonSceneDecoder))
    }
}

impl fmt::Debug for SnapshotCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCodec").finish_non_exhaustive()
    }
}

impl SnapshotCodec {
    pub fn new(decoder: Arc<dyn SceneDecoder>) -> Self {
        Self { decoder }
    }

    pub fn decoder(&self) -> &Arc<dyn SceneDecoder> {
        &self.decoder
    }

    /// Decode a framed or legacy unframed snapshot.
    ///
    /// The payload is only decoded here when the placement has to be inferred.
    pub fn decode(&self, bytes: &[u8]) -> SnapshotResult<Snapshot> {
        let Some(framed) = bytes.strip_prefix(&SNAPSHOT_MAGIC.to_le_bytes()) else {
            tracing::debug!("No snapshot magic, treating {} bytes as a legacy payload", bytes.len());
            return self.wrap(bytes.to_vec(), None);
        };

        let declared = read_i32(framed, 0).ok_or_else(|| {
            SnapshotError::Malformed("truncated before the header length".to_string())
        })?;
        let rest = &framed[4..];

        let header_len = usize::try_from(declared).map_err(|_| {
            SnapshotError::Malformed(format!("negative header length {declared}"))
        })?;
        if header_len > rest.len() {
            return Err(SnapshotError::Malformed(format!(
                "declared header length {} exceeds the remaining {} bytes",
                header_len,
                rest.len()
            )));
        }

        let (header, payload) = rest.split_at(header_len);
        let header = SnapshotHeader::parse(header)?;
        self.wrap(payload.to_vec(), header.matrix)
    }

    /// Framed encoding: magic, header length, header, payload
    pub fn encode(snapshot: &Snapshot) -> Vec<u8> {
        let header = snapshot.header();
        let header_len = header.encoded_len();

        let mut out = Vec::with_capacity(8 + header_len + snapshot.raw_payload.len());
        out.extend_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
        out.extend_from_slice(&(header_len as i32).to_le_bytes());
        header.write(&mut out);
        out.extend_from_slice(&snapshot.raw_payload);
        out
    }

    /// Wrap a raw payload with an optional known placement. Without one the
    /// payload is decoded immediately and the placement inferred.
    pub fn wrap(&self, raw_payload: Vec<u8>, matrix: Option<Mat4>) -> SnapshotResult<Snapshot> {
        let mut snapshot = Snapshot {
            placement_matrix: matrix.unwrap_or(Mat4::IDENTITY),
            matrix_is_inferred: matrix.is_none(),
            raw_payload,
            scene: OnceLock::new(),
            decoder: Arc::clone(&self.decoder),
        };

        if snapshot.matrix_is_inferred {
            snapshot.placement_matrix = transform::resolve(snapshot.scene()?);
        }

        Ok(snapshot)
    }

    /// Build a snapshot from a live scene that is already decoded
    pub fn capture(&self, scene: Scene, raw_payload: Vec<u8>, device_transform: Option<Mat4>) -> Snapshot {
        let (placement_matrix, matrix_is_inferred) = transform::read_or_infer(&scene, device_transform);
        Snapshot {
            placement_matrix,
            matrix_is_inferred,
            raw_payload,
            scene: OnceLock::from(Ok(scene)),
            decoder: Arc::clone(&self.decoder),
        }
    }

    /// Decode freshly fetched device bytes and capture them
    pub fn capture_bytes(&self, raw_payload: Vec<u8>, device_transform: Option<Mat4>) -> SnapshotResult<Snapshot> {
        let scene = self.decoder.decode(&raw_payload)?;
        Ok(self.capture(scene, raw_payload, device_transform))
    }

    /// Load and decode a snapshot file
    pub fn load(&self, path: &Path) -> SnapshotResult<Snapshot> {
        let bytes = std::fs::read(path)?;
        self.decode(&bytes)
    }
}
