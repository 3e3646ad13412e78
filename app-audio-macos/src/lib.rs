//! # app-audio-macos
//!
//! macOS ScreenCaptureKit backend for app-audio-core.
//!
//! Provides:
//! - `ScreenCaptureKitBackend`: per-application, per-window, or per-display audio
//!   capture via `SCStream`
//! - `ShareableContentEnumerator`: application/window/display snapshots via
//!   `SCShareableContent`
//!
//! ## Platform Requirements
//! - macOS 13+ (ScreenCaptureKit audio capture)
//! - Screen Recording permission granted to the host process
//!
//! ## Usage
//! ```ignore
//! use app_audio_core::{CaptureConfig, CaptureController};
//! use app_audio_macos::{ScreenCaptureKitBackend, ShareableContentEnumerator};
//!
//! let controller = CaptureController::new(ScreenCaptureKitBackend::new(), ShareableContentEnumerator);
//! let app = controller.list_applications()?.remove(0);
//! controller.start_capture(app.process_id, CaptureConfig::default(), |sample| {
//!     println!("{} frames at {:.3}s", sample.frames(), sample.timestamp());
//! })?;
//! ```

#[cfg(target_os = "macos")]
pub mod shareable_content;
#[cfg(target_os = "macos")]
pub mod stream_capture;

#[cfg(target_os = "macos")]
pub use shareable_content::ShareableContentEnumerator;
#[cfg(target_os = "macos")]
pub use stream_capture::{ScreenCaptureHandle, ScreenCaptureKitBackend};
