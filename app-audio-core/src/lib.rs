//! # app-audio-core
//!
//! Platform-agnostic core for capturing the audio of one application,
//! window, or display at a time.
//!
//! Enumerates capturable sources, runs a single exclusive capture session
//! against a platform backend, and streams decoded audio batches to a
//! caller-supplied callback through a bounded, drop-oldest queue.
//! Platform backends (macOS ScreenCaptureKit) implement the
//! `CaptureBackend` and `EnumerationBackend` traits and plug into the
//! generic `CaptureController`.
//!
//! ## Architecture
//!
//! ```text
//! app-audio-core (this crate)
//! ├── traits/       ← CaptureBackend, SampleSink, EnumerationBackend, CaptureDelegate
//! ├── models/       ← CaptureConfig, errors, CaptureState, AudioSample, snapshot rows
//! ├── processing/   ← RingBuffer, AudioSampleQueue
//! ├── catalog/      ← SourceCatalog
//! ├── session/      ← CaptureSession (state machine), CaptureController
//! └── backends/     ← in-process backends (manual capture, static enumeration)
//! ```

pub mod backends;
pub mod catalog;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backends::manual::{ManualCaptureBackend, StaticEnumerationBackend};
pub use catalog::source_catalog::SourceCatalog;
pub use models::config::{validate, CaptureConfig, RawCaptureConfig, SessionOptions};
pub use models::error::{
    BackendError, CaptureEndedUnexpectedly, CaptureError, ConfigError, EnumerationError, SampleError,
    StartFailure,
};
pub use models::sample::{AudioSample, AudioSampleCallback};
pub use models::sources::{AppInfo, DisplayInfo, Rect, WindowInfo};
pub use models::state::{CaptureState, SessionInfo};
pub use models::target::CaptureTarget;
pub use processing::ring_buffer::RingBuffer;
pub use processing::sample_queue::{AudioSampleQueue, QueueStats};
pub use session::capture_session::CaptureSession;
pub use session::controller::CaptureController;
pub use traits::capture_backend::{CaptureBackend, SampleSink};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::enumeration_backend::EnumerationBackend;
