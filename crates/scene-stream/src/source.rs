//! Where scene bytes come from: a live device or a fixed fallback snapshot

use crate::config::{CaptureConfig, QuerySettings};
use crate::error::{CaptureError, CaptureResult};
use crate::observer::{AccessStatus, SceneObserver};
use scene_core::Scene;
use scene_data::{Snapshot, SnapshotCodec};
use std::path::Path;
use std::sync::Arc;

/// Abstraction over scene acquisition.
///
/// `acquire` may block and is only called after access was granted. The
/// provided `fetch_*` methods gate access first and never fetch on denial.
pub trait SceneSource: Send + Sync {
    fn request_access(&self) -> AccessStatus {
        AccessStatus::Granted
    }

    /// Acquire a new snapshot. `previous` is an optional incremental hint.
    ///
    /// Does not check access. Callers go through [`fetch_snapshot`](Self::fetch_snapshot)
    /// or the polling coordinator, which both call [`ensure_access`](Self::ensure_access) first.
    fn acquire(&self, previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>>;

    fn ensure_access(&self) -> CaptureResult<()> {
        match self.request_access() {
            AccessStatus::Granted => Ok(()),
            AccessStatus::Denied(reason) => Err(CaptureError::AccessDenied(reason)),
        }
    }

    fn fetch_snapshot(&self, previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>> {
        self.ensure_access()?;
        self.acquire(previous)
    }

    fn fetch_bytes(&self) -> CaptureResult<Vec<u8>> {
        Ok(self.fetch_snapshot(None)?.raw_payload().to_vec())
    }

    fn fetch_decoded(&self) -> CaptureResult<Scene> {
        let snapshot = self.fetch_snapshot(None)?;
        let scene = snapshot.scene()?;
        Ok(scene.clone())
    }
}

/// Live source backed by a device [`SceneObserver`]
pub struct DeviceSceneSource<O> {
    observer: O,
    codec: SnapshotCodec,
    settings: QuerySettings,
    search_radius: f32,
}

impl<O: SceneObserver> DeviceSceneSource<O> {
    pub fn new(observer: O, codec: SnapshotCodec) -> Self {
        Self::with_config(observer, codec, &CaptureConfig::default())
    }

    pub fn with_config(observer: O, codec: SnapshotCodec, config: &CaptureConfig) -> Self {
        Self {
            observer,
            codec,
            settings: config.query.clone(),
            search_radius: config.search_radius,
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn search_radius(&self) -> f32 {
        self.search_radius
    }

    pub fn set_search_radius(&mut self, radius: f32) {
        self.search_radius = radius;
    }
}

impl<O: SceneObserver> SceneSource for DeviceSceneSource<O> {
    fn request_access(&self) -> AccessStatus {
        let status = self.observer.request_access();
        if let AccessStatus::Denied(reason) = &status {
            tracing::warn!("Scene access denied: {}", reason);
        }
        status
    }

    fn acquire(&self, previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>> {
        let bytes = self
            .observer
            .compute_serialized(&self.settings, self.search_radius, previous.map(Snapshot::raw_payload))
            .map_err(|e| CaptureError::Fetch(format!("{e:#}")))?;
        tracing::debug!("Queried {} scene bytes (radius {} m)", bytes.len(), self.search_radius);

        let snapshot = self.codec.capture_bytes(bytes, self.observer.origin_transform())?;
        Ok(Arc::new(snapshot))
    }
}

/// Fallback source that always yields the same snapshot
#[derive(Clone, Debug)]
pub struct StaticSceneSource {
    snapshot: Arc<Snapshot>,
}

impl StaticSceneSource {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    /// Load the fallback snapshot from a file
    pub fn from_file(codec: &SnapshotCodec, path: &Path) -> CaptureResult<Self> {
        let snapshot = codec.load(path)?;
        tracing::info!("Loaded fallback scene from {} ({} bytes)", path.display(), snapshot.raw_payload().len());
        Ok(Self::new(Arc::new(snapshot)))
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }
}

impl SceneSource for StaticSceneSource {
    fn acquire(&self, _previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>> {
        Ok(Arc::clone(&self.snapshot))
    }
}

/// Use the device when it supports scene queries, otherwise the fallback
pub fn select_source<O>(
    observer: O,
    codec: SnapshotCodec,
    config: &CaptureConfig,
    fallback: StaticSceneSource,
) -> Arc<dyn SceneSource>
where
    O: SceneObserver + 'static,
{
    if observer.is_supported() {
        tracing::info!("Using live device scene source");
        Arc::new(DeviceSceneSource::with_config(observer, codec, config))
    } else {
        tracing::info!("Scene queries unsupported, using fallback scene");
        Arc::new(fallback)
    }
}
