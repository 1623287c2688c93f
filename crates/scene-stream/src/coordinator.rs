//! Background scene polling
//!
//! A polling cycle acquires on tokio's blocking pool, hands the snapshot to a
//! publisher task as an explicit message, waits for the publish to land, then
//! sleeps for the configured interval. A loop cycle's result becomes visible
//! only through the publisher task; `take_snapshot_once` publishes inline on
//! the caller's thread. Both go through the same writer lock, swap the current
//! publication in one atomic store and signal observers without waiting on them.

use crate::error::{CaptureError, CaptureResult};
use crate::source::SceneSource;
use crate::state::{Phase, PollFailure, PollStatus};
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use scene_data::snapshot::SNAPSHOT_EXTENSION;
use scene_data::Snapshot;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// A published snapshot and its revision
#[derive(Clone, Debug)]
pub struct Publication {
    pub revision: u64,
    pub snapshot: Arc<Snapshot>,
}

/// Hand-off from the acquiring side to the publisher task
struct PublishRequest {
    snapshot: Arc<Snapshot>,
    done: oneshot::Sender<Publication>,
}

struct Shared {
    source: Arc<dyn SceneSource>,
    /// Current publication, read without locking
    latest: ArcSwapOption<Publication>,
    /// Writer lock for publication. Holding the observer list under it keeps
    /// notification order equal to registration order.
    observers: Mutex<Vec<mpsc::UnboundedSender<Publication>>>,
    phase: RwLock<Phase>,
    last_error: RwLock<Option<PollFailure>>,
    polling: AtomicBool,
    loop_active: AtomicBool,
    interval_ms: AtomicU64,
}

impl Shared {
    fn phase(&self) -> Phase {
        *self.phase.read()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.write() = phase;
    }

    fn record_failure(&self, phase: Phase, err: &CaptureError) {
        tracing::warn!("Scene capture failed ({}): {}", phase, err);
        self.set_phase(Phase::Failed);
        *self.last_error.write() = Some(PollFailure {
            phase,
            message: err.to_string(),
        });
    }

    /// Access gate and fetch. Blocks for as long as the source does.
    fn acquire(&self) -> CaptureResult<Arc<Snapshot>> {
        self.set_phase(Phase::RequestingAccess);
        if let Err(err) = self.source.ensure_access() {
            self.record_failure(Phase::RequestingAccess, &err);
            return Err(err);
        }

        self.set_phase(Phase::Fetching);
        let previous = self.latest.load_full();
        match self.source.acquire(previous.as_deref().map(|p| p.snapshot.as_ref())) {
            Ok(snapshot) => {
                self.last_error.write().take();
                self.set_phase(Phase::AwaitingPublish);
                Ok(snapshot)
            }
            Err(err) => {
                self.record_failure(Phase::Fetching, &err);
                Err(err)
            }
        }
    }

    fn publish(&self, snapshot: Arc<Snapshot>) -> Publication {
        let mut observers = self.observers.lock();
        let revision = self.latest.load_full().map_or(0, |p| p.revision) + 1;
        let publication = Publication { revision, snapshot };
        self.latest.store(Some(Arc::new(publication.clone())));

        // Closed receivers are dropped from the list
        observers.retain(|tx| tx.send(publication.clone()).is_ok());
        publication
    }
}

async fn run_publisher(shared: Arc<Shared>, mut requests: mpsc::UnboundedReceiver<PublishRequest>) {
    while let Some(request) = requests.recv().await {
        let publication = shared.publish(request.snapshot);
        tracing::debug!("Published scene revision {}", publication.revision);
        let _ = request.done.send(publication);
    }
}

/// One access/fetch/publish cycle. Capture failures are recorded and
/// swallowed; only a lost publisher is returned as an error.
async fn run_cycle(shared: &Arc<Shared>, publisher: &mpsc::UnboundedSender<PublishRequest>) -> CaptureResult<()> {
    let worker = Arc::clone(shared);
    let snapshot = match tokio::task::spawn_blocking(move || worker.acquire()).await {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(_)) => return Ok(()),
        Err(join_err) => {
            let err = CaptureError::Fetch(format!("scene source panicked: {join_err}"));
            shared.record_failure(shared.phase(), &err);
            return Ok(());
        }
    };

    let (done, published) = oneshot::channel();
    publisher
        .send(PublishRequest { snapshot, done })
        .map_err(|_| CaptureError::Shutdown)?;
    published.await.map_err(|_| CaptureError::Shutdown)?;

    shared.set_phase(Phase::Delaying);
    Ok(())
}

async fn run_loop(shared: Arc<Shared>, publisher: mpsc::UnboundedSender<PublishRequest>) {
    loop {
        tracing::info!(
            "Started polling every {} ms",
            shared.interval_ms.load(Ordering::Relaxed)
        );

        while shared.polling.load(Ordering::SeqCst) {
            if let Err(err) = run_cycle(&shared, &publisher).await {
                tracing::error!("Polling aborted: {}", err);
                shared.polling.store(false, Ordering::SeqCst);
                break;
            }

            let interval = Duration::from_millis(shared.interval_ms.load(Ordering::Relaxed));
            tokio::time::sleep(interval).await;
        }

        shared.set_phase(Phase::Stopped);
        shared.loop_active.store(false, Ordering::SeqCst);
        tracing::info!("Polling ended");

        // A start that landed while this loop was winding down saw it as active
        let restarted = shared.polling.load(Ordering::SeqCst)
            && !shared.loop_active.swap(true, Ordering::SeqCst);
        if !restarted {
            break;
        }
    }
}

/// Drives a [`SceneSource`] and publishes what it captures.
///
/// Readers ([`current`](Self::current), [`latest`](Self::latest)) never lock.
/// Publications are serialized and strictly ordered by revision, whether they
/// come from the polling loop or from [`take_snapshot_once`](Self::take_snapshot_once).
pub struct PollingCoordinator {
    shared: Arc<Shared>,
    publisher: mpsc::UnboundedSender<PublishRequest>,
    runtime: Handle,
}

impl PollingCoordinator {
    /// Create a coordinator whose tasks run on `runtime`
    pub fn new(source: Arc<dyn SceneSource>, runtime: Handle) -> Self {
        let shared = Arc::new(Shared {
            source,
            latest: ArcSwapOption::empty(),
            observers: Mutex::new(Vec::new()),
            phase: RwLock::new(Phase::Idle),
            last_error: RwLock::new(None),
            polling: AtomicBool::new(false),
            loop_active: AtomicBool::new(false),
            interval_ms: AtomicU64::new(0),
        });

        let (publisher, requests) = mpsc::unbounded_channel();
        runtime.spawn(run_publisher(Arc::clone(&shared), requests));

        Self { shared, publisher, runtime }
    }

    /// Start polling. While a loop is already running this only updates the
    /// interval.
    pub fn start_polling(&self, interval_ms: u64) {
        self.shared.interval_ms.store(interval_ms, Ordering::Relaxed);
        self.shared.polling.store(true, Ordering::SeqCst);

        if self.shared.loop_active.swap(true, Ordering::SeqCst) {
            tracing::debug!("Polling already running, interval now {} ms", interval_ms);
            return;
        }

        self.runtime
            .spawn(run_loop(Arc::clone(&self.shared), self.publisher.clone()));
    }

    /// Ask the loop to stop. An in-flight fetch still completes and publishes;
    /// no new cycle starts afterwards.
    pub fn stop_polling(&self) {
        tracing::info!("Stopping polling");
        self.shared.polling.store(false, Ordering::SeqCst);
        if !self.shared.loop_active.load(Ordering::SeqCst) {
            self.shared.set_phase(Phase::Stopped);
        }
    }

    pub fn is_polling(&self) -> bool {
        self.shared.polling.load(Ordering::SeqCst)
    }

    /// Run one access/fetch/publish cycle on the calling thread.
    ///
    /// Blocks while the source fetches. Failures are returned and also
    /// recorded as the last error.
    pub fn take_snapshot_once(&self) -> CaptureResult<Publication> {
        tracing::info!("Taking snapshot");
        let snapshot = self.shared.acquire()?;
        let publication = self.shared.publish(snapshot);

        // A running loop resumes its delay until its next cycle sets the phase
        if self.shared.loop_active.load(Ordering::SeqCst) {
            self.shared.set_phase(Phase::Delaying);
        } else {
            self.shared.set_phase(Phase::Idle);
        }
        Ok(publication)
    }

    /// Take one snapshot and write it to `dir` as a `.suscene` file
    pub fn take_snapshot_to(&self, dir: &Path) -> CaptureResult<PathBuf> {
        let publication = self.take_snapshot_once()?;

        std::fs::create_dir_all(dir)?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let path = dir.join(format!("serialized-scene-{stamp}.{SNAPSHOT_EXTENSION}"));
        publication.snapshot.save(&path)?;

        tracing::info!("Saved scene revision {} to {}", publication.revision, path.display());
        Ok(path)
    }

    /// Register an observer. It receives every later publication exactly once,
    /// after observers registered before it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Publication> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.observers.lock().push(tx);
        rx
    }

    pub fn latest(&self) -> Option<Arc<Publication>> {
        self.shared.latest.load_full()
    }

    /// Most recently published snapshot
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.latest().map(|p| Arc::clone(&p.snapshot))
    }

    pub fn revision(&self) -> u64 {
        self.latest().map_or(0, |p| p.revision)
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn last_error(&self) -> Option<PollFailure> {
        self.shared.last_error.read().clone()
    }

    pub fn status(&self) -> PollStatus {
        let latest = self.latest();
        let snapshot = latest.as_ref().map(|p| &p.snapshot);
        PollStatus {
            phase: self.phase(),
            revision: latest.as_ref().map_or(0, |p| p.revision),
            polling: self.is_polling(),
            last_error: self.last_error(),
            scene_size: snapshot.map(|s| s.raw_payload().len()),
            object_count: snapshot.and_then(|s| s.object_count()),
        }
    }
}

impl Drop for PollingCoordinator {
    fn drop(&mut self) {
        self.shared.polling.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::AccessStatus;
    use crate::source::StaticSceneSource;
    use glam::{Mat4, Vec3};
    use scene_core::{Scene, SceneObject, SceneObjectKind};
    use scene_data::{encode_json_payload, SnapshotCodec};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn sample_snapshot() -> Arc<Snapshot> {
        let scene = Scene::new(vec![
            SceneObject::new(1, SceneObjectKind::Floor, Mat4::from_translation(Vec3::new(0.0, 0.0, -1.5))),
            SceneObject::new(2, SceneObjectKind::Wall, Mat4::from_translation(Vec3::X)),
        ]);
        let payload = encode_json_payload(&scene).unwrap();
        Arc::new(SnapshotCodec::default().capture(scene, payload, None))
    }

    fn static_source() -> Arc<dyn SceneSource> {
        Arc::new(StaticSceneSource::new(sample_snapshot()))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    struct DeniedSource;

    impl SceneSource for DeniedSource {
        fn request_access(&self) -> AccessStatus {
            AccessStatus::Denied("no permission".to_string())
        }

        fn acquire(&self, _previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>> {
            panic!("acquire called without access");
        }
    }

    /// Fails the first `failures` fetches, then succeeds
    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
        snapshot: Arc<Snapshot>,
    }

    impl SceneSource for FlakySource {
        fn acquire(&self, _previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(CaptureError::Fetch("sensor busy".to_string()));
            }
            Ok(Arc::clone(&self.snapshot))
        }
    }

    /// Blocks every fetch for `delay`
    struct SlowSource {
        delay: Duration,
        snapshot: Arc<Snapshot>,
    }

    impl SceneSource for SlowSource {
        fn acquire(&self, _previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>> {
            std::thread::sleep(self.delay);
            Ok(Arc::clone(&self.snapshot))
        }
    }

    /// Slow source that records how many fetches overlap
    struct OverlapSource {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        snapshot: Arc<Snapshot>,
    }

    impl SceneSource for OverlapSource {
        fn acquire(&self, _previous: Option<&Snapshot>) -> CaptureResult<Arc<Snapshot>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.snapshot))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_interval_polling_publishes() {
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());
        assert_eq!(coordinator.phase(), Phase::Idle);

        coordinator.start_polling(0);
        wait_until(|| coordinator.revision() >= 5).await;

        assert!(coordinator.revision() >= 5);
        assert!(coordinator.last_error().is_none());
        assert!(coordinator.current().is_some());
        coordinator.stop_polling();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_denied_access_keeps_loop_alive() {
        let coordinator = PollingCoordinator::new(Arc::new(DeniedSource), Handle::current());
        coordinator.start_polling(60_000);

        wait_until(|| coordinator.last_error().is_some()).await;

        assert_eq!(coordinator.phase(), Phase::Failed);
        assert_eq!(coordinator.revision(), 0);
        assert!(coordinator.current().is_none());
        assert!(coordinator.is_polling());

        let failure = coordinator.last_error().unwrap();
        assert_eq!(failure.phase, Phase::RequestingAccess);
        assert!(failure.message.contains("no permission"));

        coordinator.stop_polling();
        assert!(!coordinator.is_polling());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_stabilizes_revision() {
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());
        coordinator.start_polling(1);
        wait_until(|| coordinator.revision() >= 3).await;

        coordinator.stop_polling();
        wait_until(|| coordinator.phase() == Phase::Stopped).await;

        let settled = coordinator.revision();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(coordinator.revision(), settled);
        assert_eq!(coordinator.phase(), Phase::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_mid_fetch_publishes_then_stops() {
        let source = Arc::new(SlowSource {
            delay: Duration::from_millis(200),
            snapshot: sample_snapshot(),
        });
        let coordinator = PollingCoordinator::new(source, Handle::current());
        coordinator.start_polling(0);

        wait_until(|| coordinator.phase() == Phase::Fetching).await;
        coordinator.stop_polling();
        assert_eq!(coordinator.revision(), 0);

        wait_until(|| coordinator.phase() == Phase::Stopped).await;
        assert_eq!(coordinator.revision(), 1);
        assert!(coordinator.last_error().is_none());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(coordinator.revision(), 1);
        assert_eq!(coordinator.phase(), Phase::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snapshot_once_during_delay_keeps_delaying() {
        let coordinator = Arc::new(PollingCoordinator::new(static_source(), Handle::current()));
        coordinator.start_polling(60_000);
        wait_until(|| coordinator.phase() == Phase::Delaying).await;
        assert_eq!(coordinator.revision(), 1);

        let worker = Arc::clone(&coordinator);
        let publication = tokio::task::spawn_blocking(move || worker.take_snapshot_once())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(publication.revision, 2);
        assert_eq!(coordinator.phase(), Phase::Delaying);
        coordinator.stop_polling();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_polling_restarts_after_stop() {
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());
        coordinator.start_polling(1);
        wait_until(|| coordinator.revision() >= 2).await;
        coordinator.stop_polling();
        wait_until(|| coordinator.phase() == Phase::Stopped).await;

        let before = coordinator.revision();
        coordinator.start_polling(1);
        wait_until(|| coordinator.revision() >= before + 2).await;
        coordinator.stop_polling();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_while_idle() {
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());
        coordinator.stop_polling();
        assert_eq!(coordinator.phase(), Phase::Stopped);
        assert_eq!(coordinator.revision(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_observers_notified_in_order_once() {
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());
        let mut first = coordinator.subscribe();
        let mut second = coordinator.subscribe();

        for expected in 1..=3 {
            let publication = coordinator.take_snapshot_once().unwrap();
            assert_eq!(publication.revision, expected);
        }

        for rx in [&mut first, &mut second] {
            let revisions: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
                .map(|p| p.revision)
                .collect();
            assert_eq!(revisions, vec![1, 2, 3]);
        }
        assert_eq!(coordinator.phase(), Phase::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_observer_does_not_block_others() {
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());
        drop(coordinator.subscribe());
        let mut live = coordinator.subscribe();

        coordinator.take_snapshot_once().unwrap();
        coordinator.take_snapshot_once().unwrap();

        assert_eq!(live.try_recv().unwrap().revision, 1);
        assert_eq!(live.try_recv().unwrap().revision, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_publications_are_monotonic() {
        let coordinator = Arc::new(PollingCoordinator::new(static_source(), Handle::current()));
        let mut rx = coordinator.subscribe();
        coordinator.start_polling(0);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                tokio::task::spawn_blocking(move || {
                    for _ in 0..10 {
                        coordinator.take_snapshot_once().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }

        coordinator.stop_polling();
        wait_until(|| coordinator.phase() == Phase::Stopped).await;

        let total = coordinator.revision();
        assert!(total >= 40);

        let seen: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|p| p.revision)
            .collect();
        assert_eq!(seen, (1..=total).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_repeated_start_runs_one_loop() {
        let source = Arc::new(OverlapSource {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            snapshot: sample_snapshot(),
        });
        let coordinator = PollingCoordinator::new(source.clone(), Handle::current());

        coordinator.start_polling(0);
        coordinator.start_polling(0);
        coordinator.start_polling(0);
        wait_until(|| coordinator.revision() >= 5).await;
        coordinator.stop_polling();
        wait_until(|| coordinator.phase() == Phase::Stopped).await;

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snapshot_once_propagates_and_records() {
        let coordinator = PollingCoordinator::new(Arc::new(DeniedSource), Handle::current());
        let err = coordinator.take_snapshot_once().unwrap_err();

        assert!(matches!(err, CaptureError::AccessDenied(_)));
        assert_eq!(coordinator.phase(), Phase::Failed);
        assert_eq!(coordinator.revision(), 0);
        assert_eq!(coordinator.last_error().unwrap().phase, Phase::RequestingAccess);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_success_clears_last_error() {
        let source = Arc::new(FlakySource {
            failures: 1,
            calls: AtomicUsize::new(0),
            snapshot: sample_snapshot(),
        });
        let coordinator = PollingCoordinator::new(source, Handle::current());

        assert!(matches!(coordinator.take_snapshot_once(), Err(CaptureError::Fetch(_))));
        assert_eq!(coordinator.last_error().unwrap().phase, Phase::Fetching);

        let publication = coordinator.take_snapshot_once().unwrap();
        assert_eq!(publication.revision, 1);
        assert!(coordinator.last_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_polling_recovers_after_failures() {
        let source = Arc::new(FlakySource {
            failures: 3,
            calls: AtomicUsize::new(0),
            snapshot: sample_snapshot(),
        });
        let coordinator = PollingCoordinator::new(source, Handle::current());
        coordinator.start_polling(0);

        wait_until(|| coordinator.revision() >= 2).await;
        assert!(coordinator.last_error().is_none());
        coordinator.stop_polling();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snapshot_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());

        let path = coordinator.take_snapshot_to(&dir.path().join("captures")).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some(SNAPSHOT_EXTENSION));

        let loaded = SnapshotCodec::default().load(&path).unwrap();
        let current = coordinator.current().unwrap();
        assert_eq!(loaded.raw_payload(), current.raw_payload());
        assert!(loaded.matrix_is_inferred());
        assert_eq!(loaded.placement_matrix(), current.placement_matrix());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_reports_scene() {
        let coordinator = PollingCoordinator::new(static_source(), Handle::current());
        let empty = coordinator.status();
        assert_eq!(empty.scene_size, None);
        assert_eq!(empty.object_count, None);

        coordinator.take_snapshot_once().unwrap();
        let status = coordinator.status();
        assert_eq!(status.revision, 1);
        assert_eq!(status.object_count, Some(2));
        assert_eq!(status.scene_size, Some(sample_snapshot().raw_payload().len()));
        assert!(!status.polling);
    }
}
