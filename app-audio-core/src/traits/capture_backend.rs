use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::models::config::CaptureConfig;
use crate::models::error::BackendError;
use crate::models::sample::AudioSample;
use crate::models::target::CaptureTarget;
use crate::processing::sample_queue::AudioSampleQueue;

/// Platform mechanism that intercepts audio from one capture source.
///
/// Implemented by:
/// - `ManualCaptureBackend` (in-process, driven by the host)
/// - `ScreenCaptureKitBackend` (macOS)
pub trait CaptureBackend: Send + Sync + 'static {
    /// Platform session kept alive between `begin` and `end`.
    type Handle: Send + 'static;

    /// Begin producing audio for `target`, pushing every batch into `sink`.
    ///
    /// Samples may arrive on any thread as soon as this is called; the sink
    /// already has a consumer attached.
    fn begin(
        &self,
        target: &CaptureTarget,
        config: &CaptureConfig,
        sink: SampleSink,
    ) -> Result<Self::Handle, BackendError>;

    /// Stop producing audio and release platform resources.
    fn end(&self, handle: Self::Handle);
}

type TerminationHook = Arc<dyn Fn(Uuid, String) + Send + Sync + 'static>;

/// Push side of one capture session, handed to [`CaptureBackend::begin`].
///
/// Cheap to clone. Once the owning session stops, pushes are refused and
/// termination reports are ignored.
#[derive(Clone)]
pub struct SampleSink {
    session_id: Uuid,
    queue: Arc<AudioSampleQueue>,
    clock: Instant,
    on_terminated: TerminationHook,
}

impl SampleSink {
    pub(crate) fn new(
        session_id: Uuid,
        queue: Arc<AudioSampleQueue>,
        on_terminated: TerminationHook,
    ) -> Self {
        Self {
            session_id,
            queue,
            clock: Instant::now(),
            on_terminated,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Push one interleaved batch. Returns `false` if it was refused,
    /// either because the session has stopped or the batch is malformed.
    pub fn push(&self, data: &[f32], sample_rate: u32, channels: u16, timestamp: f64) -> bool {
        self.push_owned(data.to_vec(), sample_rate, channels, timestamp)
    }

    /// Like [`push`](Self::push) without copying.
    pub fn push_owned(&self, data: Vec<f32>, sample_rate: u32, channels: u16, timestamp: f64) -> bool {
        match AudioSample::new(data, sample_rate, channels, timestamp) {
            Ok(sample) => self.queue.push(sample),
            Err(e) => {
                log::warn!("Discarding malformed batch from backend: {}", e);
                false
            }
        }
    }

    /// Seconds since this sink was created; monotonic within the session.
    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    /// Whether the session still accepts samples.
    pub fn is_open(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Report that the capture ended without being asked to stop
    /// (source process exited, display removed, stream error).
    pub fn terminated(&self, reason: impl Into<String>) {
        (self.on_terminated)(self.session_id, reason.into());
    }
}

impl std::fmt::Debug for SampleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSink")
            .field("session_id", &self.session_id)
            .field("open", &self.is_open())
            .finish()
    }
}
