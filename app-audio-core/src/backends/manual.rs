//! Host-driven backends.
//!
//! `StaticEnumerationBackend` serves snapshot lists set by the host and
//! `ManualCaptureBackend` hands the host the active [`SampleSink`] so it can
//! feed audio itself. Useful on platforms without a native adapter and as
//! test doubles.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::config::CaptureConfig;
use crate::models::error::{BackendError, EnumerationError};
use crate::models::sources::{AppInfo, DisplayInfo, WindowInfo};
use crate::models::target::CaptureTarget;
use crate::traits::capture_backend::{CaptureBackend, SampleSink};
use crate::traits::enumeration_backend::EnumerationBackend;

#[derive(Default)]
struct Snapshots {
    applications: Vec<AppInfo>,
    windows: Vec<WindowInfo>,
    displays: Vec<DisplayInfo>,
    failure: Option<EnumerationError>,
}

/// Enumeration backend returning whatever the host last stored.
#[derive(Default)]
pub struct StaticEnumerationBackend {
    snapshots: Mutex<Snapshots>,
}

impl StaticEnumerationBackend {
    pub fn with_applications(self, applications: Vec<AppInfo>) -> Self {
        self.set_applications(applications);
        self
    }

    pub fn with_windows(self, windows: Vec<WindowInfo>) -> Self {
        self.set_windows(windows);
        self
    }

    pub fn with_displays(self, displays: Vec<DisplayInfo>) -> Self {
        self.set_displays(displays);
        self
    }

    pub fn set_applications(&self, applications: Vec<AppInfo>) {
        self.snapshots.lock().applications = applications;
    }

    pub fn set_windows(&self, windows: Vec<WindowInfo>) {
        self.snapshots.lock().windows = windows;
    }

    pub fn set_displays(&self, displays: Vec<DisplayInfo>) {
        self.snapshots.lock().displays = displays;
    }

    /// Make every query fail with `error` until [`recover`](Self::recover).
    pub fn fail_with(&self, error: EnumerationError) {
        self.snapshots.lock().failure = Some(error);
    }

    pub fn recover(&self) {
        self.snapshots.lock().failure = None;
    }

    fn read<T: Clone>(&self, pick: impl FnOnce(&Snapshots) -> &Vec<T>) -> Result<Vec<T>, EnumerationError> {
        let snapshots = self.snapshots.lock();
        if let Some(ref error) = snapshots.failure {
            return Err(error.clone());
        }
        Ok(pick(&snapshots).clone())
    }
}

impl EnumerationBackend for StaticEnumerationBackend {
    fn applications(&self) -> Result<Vec<AppInfo>, EnumerationError> {
        self.read(|s| &s.applications)
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, EnumerationError> {
        self.read(|s| &s.windows)
    }

    fn displays(&self) -> Result<Vec<DisplayInfo>, EnumerationError> {
        self.read(|s| &s.displays)
    }
}

struct ActiveCapture {
    target: CaptureTarget,
    config: CaptureConfig,
    sink: SampleSink,
}

#[derive(Default)]
struct ManualState {
    active: Option<ActiveCapture>,
    next_error: Option<BackendError>,
    next_termination: Option<String>,
    begin_delay: Duration,
    begun: u64,
    ended: u64,
}

/// Handle returned by [`ManualCaptureBackend::begin`].
#[derive(Debug)]
pub struct ManualHandle {
    session_id: Uuid,
}

/// Capture backend whose audio is pushed by the host.
///
/// Clones share state, so a host can keep one clone while the controller
/// owns another.
#[derive(Clone, Default)]
pub struct ManualCaptureBackend {
    state: Arc<Mutex<ManualState>>,
}

impl ManualCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `begin` with `error`.
    pub fn fail_next_start(&self, error: BackendError) {
        self.state.lock().next_error = Some(error);
    }

    /// Make the next `begin` report termination before acknowledging,
    /// as a platform does when the source vanishes mid-start.
    pub fn terminate_next_start(&self, reason: &str) {
        self.state.lock().next_termination = Some(reason.to_owned());
    }

    /// Block every `begin` for `delay` before acknowledging.
    pub fn set_begin_delay(&self, delay: Duration) {
        self.state.lock().begin_delay = delay;
    }

    /// Push a batch into the active session. Returns `false` if there is
    /// none or the session refused it.
    pub fn push(&self, data: &[f32], sample_rate: u32, channels: u16, timestamp: f64) -> bool {
        match self.sink() {
            Some(sink) => sink.push(data, sample_rate, channels, timestamp),
            None => false,
        }
    }

    /// Simulate the platform ending the capture on its own.
    pub fn terminate(&self, reason: &str) {
        let active = self.state.lock().active.take();
        if let Some(active) = active {
            active.sink.terminated(reason);
        }
    }

    pub fn sink(&self) -> Option<SampleSink> {
        self.state.lock().active.as_ref().map(|a| a.sink.clone())
    }

    pub fn active_target(&self) -> Option<CaptureTarget> {
        self.state.lock().active.as_ref().map(|a| a.target)
    }

    pub fn active_config(&self) -> Option<CaptureConfig> {
        self.state.lock().active.as_ref().map(|a| a.config)
    }

    pub fn begin_count(&self) -> u64 {
        self.state.lock().begun
    }

    pub fn end_count(&self) -> u64 {
        self.state.lock().ended
    }
}

impl CaptureBackend for ManualCaptureBackend {
    type Handle = ManualHandle;

    fn begin(
        &self,
        target: &CaptureTarget,
        config: &CaptureConfig,
        sink: SampleSink,
    ) -> Result<ManualHandle, BackendError> {
        let delay = self.state.lock().begin_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        state.begun += 1;
        let session_id = sink.session_id();
        if let Some(reason) = state.next_termination.take() {
            drop(state);
            sink.terminated(reason);
            return Ok(ManualHandle { session_id });
        }
        state.active = Some(ActiveCapture {
            target: *target,
            config: *config,
            sink,
        });
        Ok(ManualHandle { session_id })
    }

    fn end(&self, handle: ManualHandle) {
        let mut state = self.state.lock();
        if state
            .active
            .as_ref()
            .is_some_and(|a| a.sink.session_id() == handle.session_id)
        {
            state.active = None;
        }
        state.ended += 1;
    }
}
