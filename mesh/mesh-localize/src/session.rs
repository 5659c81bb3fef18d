//! Background registration with an atomically swapped result.
//!
//! ## Usage Modes
//!
//! 1. **Synchronous**: [`LocalizationSession::register_blocking`] runs on the
//!    caller's thread
//! 2. **Threaded**: [`LocalizationSession::start`] spawns a worker;
//!    [`LocalizationSession::poll`] reports progress without blocking the
//!    caller's update loop
//!
//! In both modes a successful attempt replaces the published frame in one
//! swap. A failed attempt clears it, since the robot can no longer be
//! trusted to be where the old frame says. A cancelled attempt leaves it as
//! it was.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use mesh_registration::RigidTransform;
use mesh_segment::ExclusionVolume;
use mesh_types::IndexedMesh;
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::store::{decode_transform, encode_transform, TransformStore};
use crate::{FrameHandle, LocalizeConfig, LocalizeError, LocalizeResult, RegisteredFrame, Registrar};

/// Everything one registration attempt needs, owned so it can move to the
/// worker thread.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// Robot model vertices in the robot's own frame.
    pub robot_points: Vec<Point3<f64>>,
    /// The scanned scene.
    pub scene: IndexedMesh,
    /// Known scene objects to drop before clustering.
    pub exclusions: Vec<ExclusionVolume>,
    /// Optional starting estimate of the robot-to-world transform.
    pub seed: Option<RigidTransform>,
}

impl RegistrationRequest {
    /// Creates a request with no exclusions and no seed.
    #[must_use]
    pub const fn new(robot_points: Vec<Point3<f64>>, scene: IndexedMesh) -> Self {
        Self {
            robot_points,
            scene,
            exclusions: Vec::new(),
            seed: None,
        }
    }

    /// Sets the exclusion volumes.
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: Vec<ExclusionVolume>) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Sets the starting estimate.
    #[must_use]
    pub fn with_seed(mut self, seed: RigidTransform) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Where the session's latest registration attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// No attempt has been made.
    Idle,
    /// An attempt is running in the background.
    Running,
    /// A frame is published.
    Ready,
    /// The latest attempt failed; the message describes why.
    Failed(String),
    /// The latest attempt was cancelled.
    Cancelled,
}

/// A background attempt in flight.
struct Worker {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
    result_rx: mpsc::Receiver<LocalizeResult<Arc<RegisteredFrame>>>,
}

/// Owns the registered frame for one robot and the work that produces it.
///
/// Consumers hold a [`FrameHandle`] from [`frame_handle`](Self::frame_handle)
/// and never see a partially built frame.
///
/// # Example
///
/// ```
/// use mesh_localize::{LocalizationSession, LocalizeConfig, RegistrationRequest, RegistrationStatus};
/// use mesh_types::{unit_cube, Vector3};
///
/// let robot = unit_cube();
/// let mut scene = unit_cube();
/// scene.translate(Vector3::new(0.0, 2.0, 0.0));
///
/// let mut session = LocalizationSession::new(LocalizeConfig::default());
/// let frames = session.frame_handle();
///
/// session.start(RegistrationRequest::new(robot.vertices, scene)).unwrap();
/// assert_eq!(session.wait(), RegistrationStatus::Ready);
/// assert!(frames.is_available());
/// ```
pub struct LocalizationSession {
    registrar: Arc<Registrar>,
    frame: FrameHandle,
    store: Option<Arc<dyn TransformStore>>,
    worker: Option<Worker>,
    status: RegistrationStatus,
}

impl LocalizationSession {
    /// Creates a session with no frame and no store.
    #[must_use]
    pub fn new(config: LocalizeConfig) -> Self {
        Self {
            registrar: Arc::new(Registrar::new(config)),
            frame: FrameHandle::new(),
            store: None,
            worker: None,
            status: RegistrationStatus::Idle,
        }
    }

    /// Attaches the key-value store used by [`persist`](Self::persist),
    /// [`restore`](Self::restore) and [`seed_from`](Self::seed_from).
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TransformStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The registrar's configuration.
    #[must_use]
    pub fn config(&self) -> &LocalizeConfig {
        self.registrar.config()
    }

    /// A handle for consumers of the frame.
    #[must_use]
    pub fn frame_handle(&self) -> FrameHandle {
        self.frame.clone()
    }

    /// Snapshot of the published frame.
    #[must_use]
    pub fn current_frame(&self) -> Option<Arc<RegisteredFrame>> {
        self.frame.current()
    }

    /// Whether a frame is published.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.frame.is_available()
    }

    /// Whether a background attempt is in flight.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts a background attempt.
    ///
    /// An attempt already in flight is cancelled and joined first. The
    /// published frame stays visible until the new attempt finishes.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::Spawn`] if the worker thread cannot be created.
    pub fn start(&mut self, request: RegistrationRequest) -> LocalizeResult<()> {
        self.stop_worker();

        let (result_tx, result_rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let registrar = Arc::clone(&self.registrar);
        let frame = self.frame.clone();
        let worker_cancel = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("registration".to_owned())
            .spawn(move || {
                let result = run(&registrar, &request, &frame, &worker_cancel);
                // The session may have been dropped; nobody is listening then.
                let _ = result_tx.send(result);
            })?;

        info!("Registration started in background");
        self.worker = Some(Worker {
            handle,
            cancel,
            result_rx,
        });
        self.status = RegistrationStatus::Running;
        Ok(())
    }

    /// Checks on the background attempt without blocking.
    pub fn poll(&mut self) -> RegistrationStatus {
        let received = match &self.worker {
            Some(worker) => match worker.result_rx.try_recv() {
                Ok(result) => Some(result),
                Err(mpsc::TryRecvError::Empty) => return RegistrationStatus::Running,
                Err(mpsc::TryRecvError::Disconnected) => Some(Err(LocalizeError::WorkerLost)),
            },
            None => None,
        };
        if let Some(result) = received {
            self.finish_worker(result);
        }
        self.status.clone()
    }

    /// Blocks until the background attempt finishes.
    ///
    /// Returns the current status immediately when nothing is running.
    pub fn wait(&mut self) -> RegistrationStatus {
        if let Some(worker) = &self.worker {
            let result = worker
                .result_rx
                .recv()
                .unwrap_or(Err(LocalizeError::WorkerLost));
            self.finish_worker(result);
        }
        self.status.clone()
    }

    /// Asks the background attempt to stop.
    ///
    /// The worker notices between ICP iterations; [`poll`](Self::poll) or
    /// [`wait`](Self::wait) then reports the outcome. An attempt that had
    /// already finished still publishes.
    pub fn cancel(&self) {
        if let Some(worker) = &self.worker {
            debug!("Cancelling registration");
            worker.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Registers on the caller's thread.
    ///
    /// Any background attempt is cancelled first.
    ///
    /// # Errors
    ///
    /// Whatever [`Registrar::register_seeded`] reports.
    pub fn register_blocking(
        &mut self,
        request: &RegistrationRequest,
    ) -> LocalizeResult<Arc<RegisteredFrame>> {
        self.stop_worker();
        let result = run(&self.registrar, request, &self.frame, &AtomicBool::new(false));
        self.status = status_of(&result);
        result
    }

    /// Removes the published frame, for example when the user asks to
    /// re-register from scratch.
    pub fn invalidate(&mut self) {
        if self.frame.clear().is_some() {
            info!("Registered frame invalidated");
        }
        if self.worker.is_none() {
            self.status = RegistrationStatus::Idle;
        }
    }

    /// Saves the published frame's transform under `key`.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::NoFrame`] when nothing is published, and store or
    /// encoding errors.
    pub fn persist(&self, key: &str) -> LocalizeResult<()> {
        let store = self.store()?;
        let frame = self.frame.current().ok_or(LocalizeError::NoFrame)?;
        store.save(key, &encode_transform(frame.transform())?)?;
        info!(key, "Registered transform saved");
        Ok(())
    }

    /// Publishes the transform stored under `key` without registering.
    ///
    /// Any background attempt is cancelled first.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::MissingKey`] when nothing is stored, and store or
    /// decoding errors.
    pub fn restore(&mut self, key: &str) -> LocalizeResult<Arc<RegisteredFrame>> {
        let transform = self
            .seed_from(key)?
            .ok_or_else(|| LocalizeError::MissingKey(key.to_owned()))?;
        self.stop_worker();

        let frame = Arc::new(RegisteredFrame::restored(transform));
        self.frame.publish(Arc::clone(&frame));
        self.status = RegistrationStatus::Ready;
        info!(key, "Registered transform restored");
        Ok(frame)
    }

    /// The transform stored under `key`, if any, for use as a
    /// [`RegistrationRequest`] seed.
    ///
    /// # Errors
    ///
    /// Store or decoding errors. A missing key is `Ok(None)`.
    pub fn seed_from(&self, key: &str) -> LocalizeResult<Option<RigidTransform>> {
        self.store()?
            .load(key)?
            .map(|payload| decode_transform(&payload))
            .transpose()
    }

    fn store(&self) -> LocalizeResult<&Arc<dyn TransformStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| LocalizeError::Store("no transform store attached".to_owned()))
    }

    fn finish_worker(&mut self, result: LocalizeResult<Arc<RegisteredFrame>>) {
        if let Some(worker) = self.worker.take() {
            if worker.handle.join().is_err() {
                warn!("Registration worker panicked");
            }
        }
        self.status = status_of(&result);
    }

    /// Cancels and joins any attempt in flight, discarding its result.
    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.store(true, Ordering::SeqCst);
            let result = worker
                .result_rx
                .recv()
                .unwrap_or(Err(LocalizeError::WorkerLost));
            let _ = worker.handle.join();
            self.status = status_of(&result);
        }
    }
}

impl Drop for LocalizationSession {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

impl std::fmt::Debug for LocalizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizationSession")
            .field("config", self.registrar.config())
            .field("status", &self.status)
            .field("running", &self.worker.is_some())
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

/// One attempt: register, then publish, clear, or leave the frame.
fn run(
    registrar: &Registrar,
    request: &RegistrationRequest,
    frame: &FrameHandle,
    cancel: &AtomicBool,
) -> LocalizeResult<Arc<RegisteredFrame>> {
    let result = registrar
        .register_seeded(
            &request.robot_points,
            &request.scene,
            &request.exclusions,
            request.seed.as_ref(),
            cancel,
        )
        .and_then(|registered| {
            if cancel.load(Ordering::SeqCst) {
                Err(LocalizeError::Cancelled)
            } else {
                Ok(registered)
            }
        });

    match result {
        Ok(registered) => {
            let registered = Arc::new(registered);
            frame.publish(Arc::clone(&registered));
            Ok(registered)
        }
        Err(LocalizeError::Cancelled) => {
            info!("Registration cancelled, keeping previous frame");
            Err(LocalizeError::Cancelled)
        }
        Err(e) => {
            if frame.clear().is_some() {
                warn!(error = %e, "Registration failed, previous frame withdrawn");
            } else {
                warn!(error = %e, "Registration failed");
            }
            Err(e)
        }
    }
}

fn status_of(result: &LocalizeResult<Arc<RegisteredFrame>>) -> RegistrationStatus {
    match result {
        Ok(_) => RegistrationStatus::Ready,
        Err(LocalizeError::Cancelled) => RegistrationStatus::Cancelled,
        Err(e) => RegistrationStatus::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use mesh_types::{unit_cube, Vector3};
    use std::time::{Duration, Instant};

    fn request_at(offset: Vector3<f64>) -> RegistrationRequest {
        let mut scene = unit_cube();
        scene.translate(offset);
        RegistrationRequest::new(unit_cube().vertices, scene)
    }

    /// A scene whose only clusters are too small to hull.
    fn hopeless_request() -> RegistrationRequest {
        let scene = IndexedMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        RegistrationRequest::new(unit_cube().vertices, scene)
    }

    fn translation_of(session: &LocalizationSession) -> Vector3<f64> {
        session.current_frame().unwrap().transform().translation
    }

    #[test]
    fn starts_idle() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        assert_eq!(session.poll(), RegistrationStatus::Idle);
        assert_eq!(session.wait(), RegistrationStatus::Idle);
        assert!(!session.is_available());
        assert!(!session.is_running());
    }

    #[test]
    fn background_registration_publishes() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        let frames = session.frame_handle();

        session.start(request_at(Vector3::new(1.0, 2.0, 3.0))).unwrap();
        assert!(session.is_running());
        assert_eq!(session.wait(), RegistrationStatus::Ready);
        assert!(!session.is_running());

        let frame = frames.current().unwrap();
        assert!((frame.transform().translation - Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-6);
    }

    #[test]
    fn poll_reaches_ready() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        session.start(request_at(Vector3::new(0.0, 0.0, 4.0))).unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut status = session.poll();
        while status == RegistrationStatus::Running && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
            status = session.poll();
        }
        assert_eq!(status, RegistrationStatus::Ready);
        assert!(session.is_available());
    }

    #[test]
    fn restart_replaces_frame() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        session.register_blocking(&request_at(Vector3::new(1.0, 0.0, 0.0))).unwrap();
        let first = session.current_frame().unwrap();

        session.start(request_at(Vector3::new(5.0, 0.0, 0.0))).unwrap();
        // A second start cancels the first attempt.
        session.start(request_at(Vector3::new(7.0, 0.0, 0.0))).unwrap();
        assert_eq!(session.wait(), RegistrationStatus::Ready);

        assert!((translation_of(&session) - Vector3::new(7.0, 0.0, 0.0)).norm() < 1e-6);
        // Earlier snapshots stay intact.
        assert!((first.transform().translation - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn failure_withdraws_frame() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        session.register_blocking(&request_at(Vector3::new(1.0, 0.0, 0.0))).unwrap();
        assert!(session.is_available());

        let err = session.register_blocking(&hopeless_request()).unwrap_err();
        assert!(matches!(err, LocalizeError::NoAcceptableFit { .. }));
        assert!(!session.is_available());
        assert!(matches!(session.poll(), RegistrationStatus::Failed(_)));
    }

    #[test]
    fn background_failure_is_reported() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        session.start(hopeless_request()).unwrap();
        match session.wait() {
            RegistrationStatus::Failed(message) => assert!(message.contains("no acceptable fit")),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn cancelled_attempt_keeps_frame() {
        let frame = FrameHandle::new();
        let registrar = Registrar::default();
        let old = Arc::new(RegisteredFrame::new(RigidTransform::identity(), 0.5));
        frame.publish(Arc::clone(&old));

        let result = run(
            &registrar,
            &request_at(Vector3::new(3.0, 0.0, 0.0)),
            &frame,
            &AtomicBool::new(true),
        );
        assert!(matches!(result, Err(LocalizeError::Cancelled)));
        assert!(Arc::ptr_eq(&frame.current().unwrap(), &old));
        assert_eq!(status_of(&result), RegistrationStatus::Cancelled);
    }

    #[test]
    fn cancel_is_reported_or_completes() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        session.register_blocking(&request_at(Vector3::new(1.0, 0.0, 0.0))).unwrap();

        session.start(request_at(Vector3::new(9.0, 0.0, 0.0))).unwrap();
        session.cancel();
        match session.wait() {
            RegistrationStatus::Cancelled => {
                assert!((translation_of(&session) - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-6);
            }
            RegistrationStatus::Ready => {
                assert!((translation_of(&session) - Vector3::new(9.0, 0.0, 0.0)).norm() < 1e-6);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn invalidate_clears_frame() {
        let mut session = LocalizationSession::new(LocalizeConfig::default());
        session.register_blocking(&request_at(Vector3::new(1.0, 0.0, 0.0))).unwrap();
        session.invalidate();
        assert!(!session.is_available());
        assert_eq!(session.poll(), RegistrationStatus::Idle);
    }

    #[test]
    fn persist_and_restore() {
        let store: Arc<dyn TransformStore> = Arc::new(MemoryStore::new());

        let mut first = LocalizationSession::new(LocalizeConfig::default()).with_store(Arc::clone(&store));
        first.register_blocking(&request_at(Vector3::new(2.0, -1.0, 0.5))).unwrap();
        first.persist("robot-origin").unwrap();

        let mut second = LocalizationSession::new(LocalizeConfig::default()).with_store(store);
        let seed = second.seed_from("robot-origin").unwrap().unwrap();
        assert!((seed.translation - Vector3::new(2.0, -1.0, 0.5)).norm() < 1e-6);

        let restored = second.restore("robot-origin").unwrap();
        assert_eq!(restored.fit_error(), None);
        assert_eq!(second.poll(), RegistrationStatus::Ready);
        assert!((translation_of(&second) - Vector3::new(2.0, -1.0, 0.5)).norm() < 1e-6);
    }

    #[test]
    fn stored_seed_drives_registration() {
        let store = Arc::new(MemoryStore::new());
        let truth = RigidTransform::from_translation(Vector3::new(4.0, 4.0, 0.0));
        store.save("robot-origin", &encode_transform(&truth).unwrap()).unwrap();

        let mut session = LocalizationSession::new(LocalizeConfig::default()).with_store(store);
        let seed = session.seed_from("robot-origin").unwrap().unwrap();
        let frame = session
            .register_blocking(&request_at(Vector3::new(4.0, 4.0, 0.0)).with_seed(seed))
            .unwrap();
        assert!(frame.fit_error().unwrap() < 1e-9);
    }

    #[test]
    fn persistence_errors() {
        let session = LocalizationSession::new(LocalizeConfig::default());
        assert!(matches!(session.persist("k"), Err(LocalizeError::Store(_))));

        let mut session = session.with_store(Arc::new(MemoryStore::new()));
        assert!(matches!(session.persist("k"), Err(LocalizeError::NoFrame)));
        assert!(session.seed_from("k").unwrap().is_none());
        assert!(matches!(session.restore("k"), Err(LocalizeError::MissingKey(ref key)) if key == "k"));
    }
}
