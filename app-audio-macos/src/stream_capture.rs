//! ScreenCaptureKit capture provider for application, window, and display audio.
//!
//! Builds an `SCContentFilter` for the requested target, configures an
//! audio-only `SCStream`, and forwards every audio `CMSampleBuffer` into the
//! session's `SampleSink`.
//!
//! ## Notes
//! - ScreenCaptureKit delivers planar f32 buffers; they are interleaved here.
//! - Native rates are 8000, 16000, 24000, and 48000 Hz; other requested rates
//!   are passed through and the delivered rate is read back from each buffer.
//! - A video stream is mandatory, so a 2x2 frame is requested and ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use screencapturekit::cm::CMSampleBuffer;
use screencapturekit::shareable_content::SCShareableContent;
use screencapturekit::stream::configuration::SCStreamConfiguration;
use screencapturekit::stream::content_filter::SCContentFilter;
use screencapturekit::stream::output_trait::SCStreamOutputTrait;
use screencapturekit::stream::output_type::SCStreamOutputType;
use screencapturekit::stream::SCStream;

use app_audio_core::models::config::CaptureConfig;
use app_audio_core::models::error::BackendError;
use app_audio_core::models::target::CaptureTarget;
use app_audio_core::traits::capture_backend::{CaptureBackend, SampleSink};

const WATCHDOG_INTERVAL: Duration = Duration::from_millis(500);

/// ScreenCaptureKit audio capture.
#[derive(Debug, Default)]
pub struct ScreenCaptureKitBackend;

impl ScreenCaptureKitBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Live `SCStream` plus the watchdog that detects the source going away.
pub struct ScreenCaptureHandle {
    stream: SCStream,
    running: Arc<AtomicBool>,
    watchdog: Mutex<Option<thread::JoinHandle<()>>>,
}

// SAFETY: SCStream wraps a reference-counted Objective-C object whose
// start/stop methods may be called from any thread.
unsafe impl Send for ScreenCaptureHandle {}

impl CaptureBackend for ScreenCaptureKitBackend {
    type Handle = ScreenCaptureHandle;

    fn begin(
        &self,
        target: &CaptureTarget,
        config: &CaptureConfig,
        sink: SampleSink,
    ) -> Result<ScreenCaptureHandle, BackendError> {
        let filter = content_filter(target)?;

        let mut stream_config = SCStreamConfiguration::new();
        stream_config
            .set_captures_audio(true)
            .set_sample_rate(config.sample_rate as i32)
            .set_channel_count(config.channels as i32)
            .set_shows_cursor(!config.exclude_cursor)
            .set_width(2)
            .set_height(2);
        if config.buffer_size > 0 {
            log::debug!(
                "ScreenCaptureKit chooses its own audio buffer size; ignoring {} frames",
                config.buffer_size
            );
        }

        let mut stream = SCStream::new(&filter, &stream_config);
        let forwarder = AudioForwarder {
            sink: sink.clone(),
            fallback_rate: config.sample_rate,
            channels: config.channels,
        };
        stream.add_output_handler(forwarder, SCStreamOutputType::Audio);

        stream
            .start_capture()
            .map_err(|e| BackendError::Other(format!("SCStream start_capture failed: {:?}", e)))?;

        let running = Arc::new(AtomicBool::new(true));
        let watchdog = match *target {
            CaptureTarget::Process(pid) => spawn_watchdog(pid, Arc::clone(&running), sink),
            CaptureTarget::Window(_) | CaptureTarget::Display(_) => None,
        };

        Ok(ScreenCaptureHandle {
            stream,
            running,
            watchdog: Mutex::new(watchdog),
        })
    }

    fn end(&self, handle: ScreenCaptureHandle) {
        handle.running.store(false, Ordering::SeqCst);
        if let Err(e) = handle.stream.stop_capture() {
            log::error!("SCStream stop_capture failed: {:?}", e);
        }
        if let Some(watchdog) = handle.watchdog.lock().take() {
            let _ = watchdog.join();
        }
    }
}

/// Resolve `target` against a fresh shareable-content snapshot.
fn content_filter(target: &CaptureTarget) -> Result<SCContentFilter, BackendError> {
    let content = SCShareableContent::get()
        .map_err(|_| BackendError::PermissionDenied)?;

    let displays = content.displays();

    match *target {
        CaptureTarget::Process(pid) => {
            let apps = content.applications();
            let app = apps
                .iter()
                .find(|a| a.process_id() == pid)
                .ok_or_else(|| BackendError::SourceNotFound(format!("process {}", pid)))?;
            let display = displays
                .first()
                .ok_or_else(|| BackendError::Other("no displays available".into()))?;
            Ok(SCContentFilter::builder()
                .display(display)
                .include_applications(&[app], &[])
                .build())
        }
        CaptureTarget::Window(window_id) => {
            let windows = content.windows();
            let window = windows
                .iter()
                .find(|w| w.window_id() as u64 == window_id)
                .ok_or_else(|| BackendError::SourceNotFound(format!("window {}", window_id)))?;
            Ok(SCContentFilter::builder().window(window).build())
        }
        CaptureTarget::Display(display_id) => {
            let display = displays
                .iter()
                .find(|d| d.display_id() == display_id)
                .ok_or_else(|| BackendError::SourceNotFound(format!("display {}", display_id)))?;
            Ok(SCContentFilter::builder().display(display).build())
        }
    }
}

/// Poll whether the captured process is still alive and report when it exits.
fn spawn_watchdog(pid: i32, running: Arc<AtomicBool>, sink: SampleSink) -> Option<thread::JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("sck-watchdog".into())
        .spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(WATCHDOG_INTERVAL);
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if !process_exists(pid) {
                    sink.terminated(format!("process {} exited", pid));
                    break;
                }
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Failed to spawn watchdog for process {}: {}", pid, e);
            None
        }
    }
}

fn process_exists(pid: i32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Output handler forwarding audio buffers into the session.
struct AudioForwarder {
    sink: SampleSink,
    fallback_rate: u32,
    channels: u16,
}

impl SCStreamOutputTrait for AudioForwarder {
    fn did_output_sample_buffer(&self, sample_buffer: CMSampleBuffer, of_type: SCStreamOutputType) {
        if of_type != SCStreamOutputType::Audio || !self.sink.is_open() {
            return;
        }

        let Some(audio_buffers) = sample_buffer.audio_buffer_list() else {
            return;
        };
        if audio_buffers.num_buffers() == 0 {
            return;
        }

        let sample_rate = sample_buffer
            .format_description()
            .and_then(|fd| fd.audio_sample_rate())
            .map(|r| r as u32)
            .unwrap_or(self.fallback_rate);

        let planes: Vec<&[f32]> = audio_buffers
            .iter()
            .map(|b| bytes_to_f32_samples(b.data()))
            .collect();
        let interleaved = interleave(&planes, self.channels as usize);
        if interleaved.is_empty() {
            return;
        }

        self.sink
            .push_owned(interleaved, sample_rate, self.channels, self.sink.elapsed_secs());
    }
}

/// Interleave planar channel buffers into `channels`-wide frames.
///
/// A mono source feeding a stereo session is duplicated to both channels;
/// missing channels are filled with silence.
fn interleave(planes: &[&[f32]], channels: usize) -> Vec<f32> {
    let frames = planes.first().map(|p| p.len()).unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for ch in 0..channels {
            let plane = if planes.len() == 1 { planes[0] } else { planes.get(ch).copied().unwrap_or(&[]) };
            out.push(plane.get(frame).copied().unwrap_or(0.0));
        }
    }
    out
}

fn bytes_to_f32_samples(bytes: &[u8]) -> &[f32] {
    let len = bytes.len() / 4;
    if len == 0 || bytes.len() % 4 != 0 {
        return &[];
    }
    if bytes.as_ptr() as usize % std::mem::align_of::<f32>() != 0 {
        return &[];
    }
    // SAFETY: length and alignment checked above; f32 has no invalid bit patterns.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, len) }
}
