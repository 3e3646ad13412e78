use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use uuid::Uuid;

use crate::models::config::{self, CaptureConfig, RawCaptureConfig, SessionOptions};
use crate::models::error::{CaptureEndedUnexpectedly, CaptureError, StartFailure};
use crate::models::sample::{AudioSample, AudioSampleCallback};
use crate::models::state::{CaptureState, SessionInfo};
use crate::models::target::CaptureTarget;
use crate::processing::sample_queue::{AudioSampleQueue, QueueStats};
use crate::traits::capture_backend::{CaptureBackend, SampleSink};
use crate::traits::capture_delegate::CaptureDelegate;

/// One start-to-stop capture lifetime.
struct ActiveSession {
    info: SessionInfo,
    queue: Arc<AudioSampleQueue>,
}

/// Internal state; the public [`CaptureState`] is derived from it.
enum Phase<H> {
    Idle,
    Starting {
        session: Arc<ActiveSession>,
        cancelled: bool,
        failure: Option<String>,
    },
    Capturing {
        session: Arc<ActiveSession>,
        handle: H,
    },
    Stopping {
        session: Arc<ActiveSession>,
    },
}

impl<H> Phase<H> {
    fn state(&self) -> CaptureState {
        match self {
            Self::Idle => CaptureState::Idle,
            Self::Starting { .. } => CaptureState::Starting,
            Self::Capturing { .. } => CaptureState::Capturing,
            Self::Stopping { .. } => CaptureState::Stopping,
        }
    }
}

struct Slot<H> {
    phase: Phase<H>,
    // Queue of the active or most recently finished session, for stats.
    last_queue: Option<Arc<AudioSampleQueue>>,
}

struct SessionCore<B: CaptureBackend> {
    backend: Arc<B>,
    options: SessionOptions,
    slot: Mutex<Slot<B::Handle>>,
    idle: Condvar,
    delegate: RwLock<Option<Arc<dyn CaptureDelegate>>>,
}

impl<B: CaptureBackend> SessionCore<B> {
    fn notify(&self, state: CaptureState) {
        let delegate = self.delegate.read().clone();
        if let Some(delegate) = delegate {
            delegate.on_state_changed(&state);
        }
    }

    fn termination_hook(core: &Arc<Self>) -> Arc<dyn Fn(Uuid, String) + Send + Sync> {
        let weak: Weak<Self> = Arc::downgrade(core);
        Arc::new(move |session_id: Uuid, reason: String| {
            if let Some(core) = weak.upgrade() {
                core.handle_termination(session_id, reason);
            }
        })
    }

    /// Run `backend.begin` on a helper thread, waiting at most `start_timeout`.
    ///
    /// A handle acknowledged after the deadline is ended immediately.
    fn begin_with_timeout(&self, info: &SessionInfo, sink: SampleSink) -> Result<B::Handle, StartFailure> {
        let (tx, rx) = mpsc::sync_channel(1);
        let abandoned = Arc::new(Mutex::new(false));

        let backend = Arc::clone(&self.backend);
        let thread_abandoned = Arc::clone(&abandoned);
        let target = info.target;
        let config = info.config;

        thread::Builder::new()
            .name("capture-start".into())
            .spawn(move || {
                let result = backend.begin(&target, &config, sink);
                let abandoned = thread_abandoned.lock();
                if *abandoned {
                    drop(abandoned);
                    if let Ok(handle) = result {
                        log::warn!("Backend acknowledged {} after the start timeout; ending it", target);
                        backend.end(handle);
                    }
                } else {
                    let _ = tx.send(result);
                }
            })
            .map_err(|e| {
                log::error!("Failed to spawn start thread: {}", e);
                StartFailure::Spawn("capture-start".into())
            })?;

        match rx.recv_timeout(self.options.start_timeout) {
            Ok(result) => result.map_err(StartFailure::from),
            Err(RecvTimeoutError::Timeout) => {
                *abandoned.lock() = true;
                // The result may have landed between the timeout and the flag.
                if let Ok(Ok(handle)) = rx.try_recv() {
                    self.backend.end(handle);
                }
                log::warn!(
                    "Backend did not acknowledge {} within {:?}",
                    info.target,
                    self.options.start_timeout
                );
                Err(StartFailure::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(StartFailure::Backend("start thread exited without a result".into()))
            }
        }
    }

    /// Run `backend.end`, waiting at most `stop_timeout`. A backend that
    /// overruns is treated as stopped.
    fn end_with_timeout(&self, handle: B::Handle) {
        let (tx, rx) = mpsc::channel();
        let pending = Arc::new(Mutex::new(Some(handle)));
        let thread_pending = Arc::clone(&pending);
        let backend = Arc::clone(&self.backend);

        let spawned = thread::Builder::new()
            .name("capture-stop".into())
            .spawn(move || {
                let handle = thread_pending.lock().take();
                if let Some(handle) = handle {
                    backend.end(handle);
                }
                let _ = tx.send(());
            });

        match spawned {
            Ok(_) => {
                if rx.recv_timeout(self.options.stop_timeout).is_err() {
                    log::warn!(
                        "Backend did not confirm stop within {:?}; treating session as stopped",
                        self.options.stop_timeout
                    );
                }
            }
            Err(e) => {
                log::error!("Failed to spawn stop thread: {}; ending inline", e);
                let handle = pending.lock().take();
                if let Some(handle) = handle {
                    self.backend.end(handle);
                }
            }
        }
    }

    /// Release a handle without waiting; used when the backend itself
    /// reported termination and may be calling from its own thread.
    fn end_detached(&self, handle: B::Handle) {
        let backend = Arc::clone(&self.backend);
        if let Err(e) = thread::Builder::new()
            .name("capture-teardown".into())
            .spawn(move || backend.end(handle))
        {
            log::error!("Failed to spawn teardown thread: {}", e);
        }
    }

    fn settle_idle(&self) {
        {
            let mut slot = self.slot.lock();
            slot.phase = Phase::Idle;
        }
        self.idle.notify_all();
        self.notify(CaptureState::Idle);
    }

    fn wait_idle(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while !matches!(slot.phase, Phase::Idle) {
            if self.idle.wait_until(&mut slot, deadline).timed_out() {
                log::warn!("Capture session did not return to idle within {:?}", timeout);
                break;
            }
        }
    }

    fn finish_start(
        &self,
        session: Arc<ActiveSession>,
        outcome: Result<B::Handle, StartFailure>,
    ) -> Result<(), CaptureError> {
        let mut slot = self.slot.lock();
        let (cancelled, failure) = match &slot.phase {
            Phase::Starting {
                session: current,
                cancelled,
                failure,
            } if current.info.session_id == session.info.session_id => (*cancelled, failure.clone()),
            _ => (true, None),
        };

        let reason = match outcome {
            Ok(handle) if !cancelled && failure.is_none() => {
                slot.phase = Phase::Capturing {
                    session: Arc::clone(&session),
                    handle,
                };
                drop(slot);
                log::info!(
                    "Capturing {} (session {})",
                    session.info.target,
                    session.info.session_id
                );
                self.notify(CaptureState::Capturing);
                return Ok(());
            }
            Ok(handle) => {
                drop(slot);
                self.end_with_timeout(handle);
                match failure {
                    Some(reason) => StartFailure::Backend(reason),
                    None => StartFailure::Cancelled,
                }
            }
            Err(reason) => {
                drop(slot);
                reason
            }
        };

        session.queue.close();
        self.settle_idle();
        log::warn!("Capture of {} failed to start: {}", session.info.target, reason);
        Err(CaptureError::CaptureStartFailed(reason))
    }

    fn handle_termination(&self, session_id: Uuid, reason: String) {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut slot.phase, Phase::Idle) {
            Phase::Capturing { session, handle } if session.info.session_id == session_id => {
                slot.phase = Phase::Stopping {
                    session: Arc::clone(&session),
                };
                drop(slot);
                log::warn!(
                    "Capture of {} ended unexpectedly: {}",
                    session.info.target,
                    reason
                );
                self.notify(CaptureState::Stopping);
                self.end_detached(handle);
                session.queue.close();
                self.settle_idle();

                let event = CaptureEndedUnexpectedly {
                    session_id,
                    target: session.info.target,
                    reason,
                };
                let delegate = self.delegate.read().clone();
                if let Some(delegate) = delegate {
                    delegate.on_capture_ended_unexpectedly(&event);
                }
            }
            Phase::Starting {
                session,
                cancelled,
                failure,
            } if session.info.session_id == session_id => {
                slot.phase = Phase::Starting {
                    session,
                    cancelled,
                    failure: failure.or(Some(reason)),
                };
            }
            other => {
                slot.phase = other;
                log::debug!("Ignoring termination report from stale session {}", session_id);
            }
        }
    }
}

/// State machine owning at most one active capture.
///
/// ```text
/// [Backend thread] → SampleSink → [AudioSampleQueue] → [delivery thread] → callback
///                         ↓
///                    terminated() → CaptureDelegate
/// ```
///
/// Every transition happens under one mutex, so of two racing `start`
/// calls exactly one reaches `Starting` and the other gets
/// [`CaptureError::AlreadyCapturing`]. Backend calls run outside the lock
/// with bounded waits.
pub struct CaptureSession<B: CaptureBackend> {
    core: Arc<SessionCore<B>>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, SessionOptions::default())
    }

    pub fn with_options(backend: B, options: SessionOptions) -> Self {
        Self {
            core: Arc::new(SessionCore {
                backend: Arc::new(backend),
                options,
                slot: Mutex::new(Slot {
                    phase: Phase::Idle,
                    last_queue: None,
                }),
                idle: Condvar::new(),
                delegate: RwLock::new(None),
            }),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.core.delegate.write() = Some(delegate);
    }

    pub fn options(&self) -> &SessionOptions {
        &self.core.options
    }

    pub fn backend(&self) -> &B {
        &self.core.backend
    }

    pub fn state(&self) -> CaptureState {
        self.core.slot.lock().phase.state()
    }

    /// True only in `Capturing`.
    pub fn is_capturing(&self) -> bool {
        self.state().is_capturing()
    }

    /// The session occupying the capture slot, if `Starting` or `Capturing`.
    pub fn current_session(&self) -> Option<SessionInfo> {
        match &self.core.slot.lock().phase {
            Phase::Starting { session, .. } | Phase::Capturing { session, .. } => {
                Some(session.info.clone())
            }
            Phase::Idle | Phase::Stopping { .. } => None,
        }
    }

    /// Counters of the active or most recently finished session.
    pub fn queue_stats(&self) -> QueueStats {
        let queue = self.core.slot.lock().last_queue.clone();
        queue.map(|q| q.stats()).unwrap_or_default()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.queue_stats().dropped
    }

    /// Start capturing `target`, delivering every batch to `on_sample`.
    ///
    /// Transitions: idle → starting → capturing, or back to idle on failure.
    pub fn start<F>(
        &self,
        target: CaptureTarget,
        config: impl Into<RawCaptureConfig>,
        on_sample: F,
    ) -> Result<(), CaptureError>
    where
        F: Fn(AudioSample) + Send + Sync + 'static,
    {
        self.start_with_callback(target, config.into(), Arc::new(on_sample))
    }

    pub fn start_with_callback(
        &self,
        target: CaptureTarget,
        raw: RawCaptureConfig,
        callback: AudioSampleCallback,
    ) -> Result<(), CaptureError> {
        let session = {
            let mut slot = self.core.slot.lock();
            if !matches!(slot.phase, Phase::Idle) {
                return Err(CaptureError::AlreadyCapturing);
            }
            let config: CaptureConfig = config::validate(raw)?;

            let queue = Arc::new(AudioSampleQueue::new(
                self.core.options.effective_queue_capacity(),
                callback,
            ));
            let session = Arc::new(ActiveSession {
                info: SessionInfo::new(target, config),
                queue,
            });
            slot.phase = Phase::Starting {
                session: Arc::clone(&session),
                cancelled: false,
                failure: None,
            };
            slot.last_queue = Some(Arc::clone(&session.queue));
            session
        };
        log::info!(
            "Starting capture of {} at {} Hz x{} (session {})",
            target,
            session.info.config.sample_rate,
            session.info.config.channels,
            session.info.session_id
        );
        self.core.notify(CaptureState::Starting);

        // Consumer exists before the backend can produce anything.
        if let Err(reason) = session.queue.start_consumer() {
            return self.core.finish_start(session, Err(reason));
        }

        let sink = SampleSink::new(
            session.info.session_id,
            Arc::clone(&session.queue),
            SessionCore::termination_hook(&self.core),
        );
        let outcome = self.core.begin_with_timeout(&session.info, sink);
        self.core.finish_start(session, outcome)
    }

    /// Stop the active capture, flushing queued batches to the callback.
    ///
    /// No-op when idle. When it returns the session is idle and the old
    /// callback receives nothing further.
    pub fn stop(&self) {
        let mut slot = self.core.slot.lock();
        match std::mem::replace(&mut slot.phase, Phase::Idle) {
            Phase::Idle => {}
            Phase::Capturing { session, handle } => {
                slot.phase = Phase::Stopping {
                    session: Arc::clone(&session),
                };
                drop(slot);
                self.core.notify(CaptureState::Stopping);

                self.core.end_with_timeout(handle);
                session.queue.close();
                self.core.settle_idle();

                let stats = session.queue.stats();
                log::info!(
                    "Stopped capture of {} (session {}): {} delivered, {} dropped",
                    session.info.target,
                    session.info.session_id,
                    stats.delivered,
                    stats.dropped
                );
            }
            Phase::Starting {
                session, failure, ..
            } => {
                let queue = Arc::clone(&session.queue);
                slot.phase = Phase::Starting {
                    session,
                    cancelled: true,
                    failure,
                };
                drop(slot);

                queue.close();
                // The closer that owns the delivery thread joins it, so the
                // callback must not wait on that closer.
                if !queue.on_delivery_thread() {
                    let options = &self.core.options;
                    self.core.wait_idle(options.start_timeout + options.stop_timeout);
                }
            }
            Phase::Stopping { session } => {
                let queue = Arc::clone(&session.queue);
                slot.phase = Phase::Stopping { session };
                drop(slot);

                queue.close();
                if !queue.on_delivery_thread() {
                    self.core.wait_idle(self.core.options.stop_timeout);
                }
            }
        }
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        if !self.state().is_idle() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::manual::ManualCaptureBackend;
    use crate::models::error::{BackendError, ConfigError};
    use std::sync::Barrier;

    fn session() -> (CaptureSession<ManualCaptureBackend>, ManualCaptureBackend) {
        let backend = ManualCaptureBackend::new();
        (CaptureSession::new(backend.clone()), backend)
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(AudioSample) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |s: AudioSample| sink.lock().push(s.timestamp()))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<CaptureState>>,
        ended: Mutex<Vec<CaptureEndedUnexpectedly>>,
    }

    impl CaptureDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: &CaptureState) {
            self.states.lock().push(*state);
        }

        fn on_capture_ended_unexpectedly(&self, event: &CaptureEndedUnexpectedly) {
            self.ended.lock().push(event.clone());
        }
    }

    #[test]
    fn start_then_stop_round_trip() {
        let (session, backend) = session();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        let (seen, cb) = recorder();

        session
            .start(CaptureTarget::Process(42), CaptureConfig::default(), cb)
            .unwrap();
        assert!(session.is_capturing());
        assert_eq!(backend.active_target(), Some(CaptureTarget::Process(42)));

        for t in [0.1, 0.2, 0.3] {
            assert!(backend.push(&[0.0, 0.0], 48000, 2, t));
        }
        session.stop();

        assert!(!session.is_capturing());
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(*seen.lock(), vec![0.1, 0.2, 0.3]);
        assert_eq!(backend.end_count(), 1);
        assert_eq!(
            *delegate.states.lock(),
            vec![
                CaptureState::Starting,
                CaptureState::Capturing,
                CaptureState::Stopping,
                CaptureState::Idle
            ]
        );
    }

    #[test]
    fn invalid_config_leaves_session_idle() {
        let (session, backend) = session();
        let raw = RawCaptureConfig {
            channels: Some(6),
            ..Default::default()
        };
        let err = session.start(CaptureTarget::Display(1), raw, |_| {}).unwrap_err();

        assert_eq!(err, CaptureError::Config(ConfigError::InvalidChannelCount(6)));
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(backend.begin_count(), 0);
    }

    #[test]
    fn second_start_is_rejected_and_first_session_untouched() {
        let (session, backend) = session();
        let (first_seen, first_cb) = recorder();
        let (second_seen, second_cb) = recorder();

        session
            .start(CaptureTarget::Display(1), CaptureConfig::default(), first_cb)
            .unwrap();
        let before = session.current_session().unwrap();

        let mono = RawCaptureConfig {
            channels: Some(1),
            ..Default::default()
        };
        let err = session
            .start(CaptureTarget::Display(1), mono, second_cb)
            .unwrap_err();
        assert_eq!(err, CaptureError::AlreadyCapturing);

        let after = session.current_session().unwrap();
        assert_eq!(before, after);
        assert!(session.is_capturing());
        assert_eq!(backend.begin_count(), 1);

        backend.push(&[0.5, 0.5], 48000, 2, 1.0);
        session.stop();
        assert_eq!(*first_seen.lock(), vec![1.0]);
        assert!(second_seen.lock().is_empty());
    }

    #[test]
    fn already_capturing_wins_over_bad_config() {
        let (session, _backend) = session();
        session
            .start(CaptureTarget::Window(9), CaptureConfig::default(), |_| {})
            .unwrap();
        let bad = RawCaptureConfig {
            sample_rate: Some(0),
            ..Default::default()
        };
        assert_eq!(
            session.start(CaptureTarget::Window(9), bad, |_| {}),
            Err(CaptureError::AlreadyCapturing)
        );
    }

    #[test]
    fn racing_starts_produce_exactly_one_winner() {
        let backend = ManualCaptureBackend::new();
        backend.set_begin_delay(Duration::from_millis(50));
        let session = Arc::new(CaptureSession::new(backend.clone()));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let session = Arc::clone(&session);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    session.start(CaptureTarget::Process(100 + i), CaptureConfig::default(), |_| {})
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| **r == Err(CaptureError::AlreadyCapturing))
                .count(),
            1
        );
        assert_eq!(backend.begin_count(), 1);
        session.stop();
    }

    #[test]
    fn backend_failure_returns_to_idle() {
        let (session, backend) = session();
        backend.fail_next_start(BackendError::PermissionDenied);

        let err = session
            .start(CaptureTarget::Process(7), CaptureConfig::default(), |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            CaptureError::CaptureStartFailed(StartFailure::PermissionDenied)
        );
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.current_session().is_none());

        // Slot is free again.
        session
            .start(CaptureTarget::Process(7), CaptureConfig::default(), |_| {})
            .unwrap();
        assert!(session.is_capturing());
    }

    #[test]
    fn slow_backend_times_out_and_is_ended_later() {
        let backend = ManualCaptureBackend::new();
        backend.set_begin_delay(Duration::from_millis(200));
        let options = SessionOptions {
            start_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let session = CaptureSession::with_options(backend.clone(), options);

        let err = session
            .start(CaptureTarget::Display(2), CaptureConfig::default(), |_| {})
            .unwrap_err();
        assert_eq!(err, CaptureError::CaptureStartFailed(StartFailure::Timeout));
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(wait_for(|| backend.end_count() == 1));
    }

    #[test]
    fn stop_during_start_cancels() {
        let backend = ManualCaptureBackend::new();
        backend.set_begin_delay(Duration::from_millis(100));
        let session = Arc::new(CaptureSession::new(backend.clone()));

        let starter = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                session.start(CaptureTarget::Window(5), CaptureConfig::default(), |_| {})
            })
        };
        assert!(wait_for(|| session.state() == CaptureState::Starting));
        assert!(!session.is_capturing());
        session.stop();

        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(
            starter.join().unwrap(),
            Err(CaptureError::CaptureStartFailed(StartFailure::Cancelled))
        );
        assert_eq!(backend.end_count(), 1);
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let (session, backend) = session();
        session.stop();
        session.stop();
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(backend.end_count(), 0);
    }

    #[test]
    fn nothing_delivered_after_stop_returns() {
        let (session, backend) = session();
        let (seen, cb) = recorder();
        session
            .start(CaptureTarget::Process(1), CaptureConfig::default(), cb)
            .unwrap();
        let sink = backend.sink().unwrap();

        sink.push(&[0.0], 48000, 1, 1.0);
        session.stop();
        let delivered = seen.lock().len();

        assert!(!sink.push(&[0.0], 48000, 1, 2.0));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(seen.lock().len(), delivered);
        assert_eq!(delivered, 1);
        assert_eq!(session.queue_stats().rejected, 1);
    }

    #[test]
    fn unexpected_termination_notifies_delegate() {
        let (session, backend) = session();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        let (seen, cb) = recorder();

        session
            .start(CaptureTarget::Process(77), CaptureConfig::default(), cb)
            .unwrap();
        let id = session.current_session().unwrap().session_id;
        backend.push(&[0.1, 0.1], 48000, 2, 0.5);
        backend.terminate("process exited");

        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(*seen.lock(), vec![0.5]);
        let ended = delegate.ended.lock();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].session_id, id);
        assert_eq!(ended[0].target, CaptureTarget::Process(77));
        assert_eq!(ended[0].reason, "process exited");
        assert!(wait_for(|| backend.end_count() == 1));
    }

    #[test]
    fn termination_during_start_fails_the_start() {
        let (session, backend) = session();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        backend.terminate_next_start("source vanished");

        let err = session
            .start(CaptureTarget::Window(12), CaptureConfig::default(), |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            CaptureError::CaptureStartFailed(StartFailure::Backend("source vanished".into()))
        );
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(delegate.ended.lock().is_empty());
        assert_eq!(backend.end_count(), 1);
        assert_eq!(
            *delegate.states.lock(),
            vec![CaptureState::Starting, CaptureState::Idle]
        );
    }

    #[test]
    fn concurrent_stop_returns_only_after_flush() {
        let options = SessionOptions {
            stop_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let backend = ManualCaptureBackend::new();
        let session = Arc::new(CaptureSession::with_options(backend.clone(), options));
        let delivered = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);

        session
            .start(CaptureTarget::Display(1), CaptureConfig::default(), move |_: AudioSample| {
                thread::sleep(Duration::from_millis(50));
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .unwrap();
        for t in 0..20 {
            assert!(backend.push(&[0.0, 0.0], 48000, 2, t as f64));
        }

        let first = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.stop())
        };
        assert!(wait_for(|| session.state() == CaptureState::Stopping));
        assert!(!session.is_capturing());
        session.stop();

        assert_eq!(delivered.load(std::sync::atomic::Ordering::SeqCst), 20);
        assert_eq!(session.state(), CaptureState::Idle);
        first.join().unwrap();
    }

    #[test]
    fn stale_termination_is_ignored() {
        let (session, backend) = session();
        session
            .start(CaptureTarget::Process(1), CaptureConfig::default(), |_| {})
            .unwrap();
        let old_sink = backend.sink().unwrap();
        session.stop();

        session
            .start(CaptureTarget::Process(2), CaptureConfig::default(), |_| {})
            .unwrap();
        old_sink.terminated("late report");
        assert!(session.is_capturing());
        assert_eq!(
            session.current_session().unwrap().target,
            CaptureTarget::Process(2)
        );
    }

    #[test]
    fn overflow_is_counted_and_order_kept() {
        let options = SessionOptions {
            queue_capacity: 2,
            ..Default::default()
        };
        let backend = ManualCaptureBackend::new();
        let session = CaptureSession::with_options(backend.clone(), options);
        let gate = Arc::new(Barrier::new(2));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let cb_gate = Arc::clone(&gate);
        let cb_seen = Arc::clone(&seen);
        let first = Arc::new(std::sync::atomic::AtomicBool::new(true));
        session
            .start(CaptureTarget::Display(1), CaptureConfig::default(), move |s: AudioSample| {
                // Hold the consumer on the first batch until the producer is done.
                if first.swap(false, std::sync::atomic::Ordering::SeqCst) {
                    cb_gate.wait();
                }
                cb_seen.lock().push(s.timestamp());
            })
            .unwrap();

        assert!(backend.push(&[0.0, 0.0], 48000, 2, 0.0));
        // Let the consumer pick up the first batch and park on the gate.
        thread::sleep(Duration::from_millis(20));
        for t in 1..=10 {
            backend.push(&[0.0, 0.0], 48000, 2, t as f64);
        }
        gate.wait();
        session.stop();

        let seen = seen.lock();
        assert!(session.dropped_samples() > 0);
        assert_eq!(seen.len() as u64 + session.dropped_samples(), 11);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last().copied(), Some(10.0));
    }

    #[test]
    fn stop_from_inside_callback_does_not_deadlock() {
        let backend = ManualCaptureBackend::new();
        let session = Arc::new(CaptureSession::new(backend.clone()));
        let weak = Arc::downgrade(&session);

        session
            .start(CaptureTarget::Window(3), CaptureConfig::default(), move |_| {
                if let Some(session) = weak.upgrade() {
                    session.stop();
                }
            })
            .unwrap();
        backend.push(&[0.0], 48000, 1, 0.0);

        assert!(wait_for(|| session.state() == CaptureState::Idle));
        assert!(wait_for(|| backend.end_count() == 1));
    }

    #[test]
    fn drop_forces_stop() {
        let backend = ManualCaptureBackend::new();
        {
            let session = CaptureSession::new(backend.clone());
            session
                .start(CaptureTarget::Display(1), CaptureConfig::default(), |_| {})
                .unwrap();
        }
        assert_eq!(backend.end_count(), 1);
        assert!(backend.active_target().is_none());
    }
}
