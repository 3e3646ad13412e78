use std::sync::Arc;

use crate::catalog::source_catalog::SourceCatalog;
use crate::models::config::{RawCaptureConfig, SessionOptions};
use crate::models::error::{CaptureError, EnumerationError};
use crate::models::sample::AudioSample;
use crate::models::sources::{AppInfo, DisplayInfo, WindowInfo};
use crate::models::state::{CaptureState, SessionInfo};
use crate::models::target::CaptureTarget;
use crate::processing::sample_queue::QueueStats;
use crate::session::capture_session::CaptureSession;
use crate::traits::capture_backend::CaptureBackend;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::enumeration_backend::EnumerationBackend;

/// Public entry point: source enumeration plus one capture session.
///
/// Dropping the controller stops any active capture, so no backend
/// session outlives it.
pub struct CaptureController<C: CaptureBackend, E: EnumerationBackend> {
    catalog: SourceCatalog<E>,
    session: CaptureSession<C>,
}

impl<C: CaptureBackend, E: EnumerationBackend> CaptureController<C, E> {
    pub fn new(capture: C, enumeration: E) -> Self {
        Self::with_options(capture, enumeration, SessionOptions::default())
    }

    pub fn with_options(capture: C, enumeration: E, options: SessionOptions) -> Self {
        Self {
            catalog: SourceCatalog::new(enumeration),
            session: CaptureSession::with_options(capture, options),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        self.session.set_delegate(delegate);
    }

    pub fn list_applications(&self) -> Result<Vec<AppInfo>, EnumerationError> {
        self.catalog.list_applications()
    }

    pub fn list_windows(&self) -> Result<Vec<WindowInfo>, EnumerationError> {
        self.catalog.list_windows()
    }

    pub fn list_displays(&self) -> Result<Vec<DisplayInfo>, EnumerationError> {
        self.catalog.list_displays()
    }

    /// Capture the audio of the application running as `process_id`.
    pub fn start_capture<F>(
        &self,
        process_id: i32,
        config: impl Into<RawCaptureConfig>,
        on_sample: F,
    ) -> Result<(), CaptureError>
    where
        F: Fn(AudioSample) + Send + Sync + 'static,
    {
        self.session
            .start(CaptureTarget::Process(process_id), config, on_sample)
    }

    pub fn start_capture_for_window<F>(
        &self,
        window_id: u64,
        config: impl Into<RawCaptureConfig>,
        on_sample: F,
    ) -> Result<(), CaptureError>
    where
        F: Fn(AudioSample) + Send + Sync + 'static,
    {
        self.session
            .start(CaptureTarget::Window(window_id), config, on_sample)
    }

    pub fn start_capture_for_display<F>(
        &self,
        display_id: u32,
        config: impl Into<RawCaptureConfig>,
        on_sample: F,
    ) -> Result<(), CaptureError>
    where
        F: Fn(AudioSample) + Send + Sync + 'static,
    {
        self.session
            .start(CaptureTarget::Display(display_id), config, on_sample)
    }

    pub fn stop_capture(&self) {
        self.session.stop();
    }

    pub fn is_capturing(&self) -> bool {
        self.session.is_capturing()
    }

    pub fn state(&self) -> CaptureState {
        self.session.state()
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.session.current_session()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.session.queue_stats()
    }

    /// Batches lost to overflow in the active or last session.
    pub fn dropped_samples(&self) -> u64 {
        self.session.dropped_samples()
    }

    pub fn catalog(&self) -> &SourceCatalog<E> {
        &self.catalog
    }

    pub fn session(&self) -> &CaptureSession<C> {
        &self.session
    }
}
