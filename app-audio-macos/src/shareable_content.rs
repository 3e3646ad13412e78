//! Source enumeration via `SCShareableContent`.
//!
//! Every query fetches a fresh `SCShareableContent` snapshot. Fetching fails
//! when the host lacks Screen Recording permission.

use screencapturekit::shareable_content::SCShareableContent;

use app_audio_core::models::error::EnumerationError;
use app_audio_core::models::sources::{AppInfo, DisplayInfo, Rect, WindowInfo};
use app_audio_core::traits::enumeration_backend::EnumerationBackend;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGMainDisplayID() -> u32;
}

fn main_display_id() -> u32 {
    // SAFETY: CGMainDisplayID takes no arguments and only reads window-server state.
    unsafe { CGMainDisplayID() }
}

/// Enumerates applications, windows, and displays visible to ScreenCaptureKit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShareableContentEnumerator;

impl ShareableContentEnumerator {
    fn content() -> Result<SCShareableContent, EnumerationError> {
        SCShareableContent::get()
            .map_err(|e| EnumerationError::Unavailable(format!("SCShareableContent::get failed: {:?}", e)))
    }
}

impl EnumerationBackend for ShareableContentEnumerator {
    fn applications(&self) -> Result<Vec<AppInfo>, EnumerationError> {
        let content = Self::content()?;
        Ok(content
            .applications()
            .iter()
            .map(|app| AppInfo {
                process_id: app.process_id(),
                bundle_identifier: app.bundle_identifier(),
                application_name: app.application_name(),
            })
            .collect())
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, EnumerationError> {
        let content = Self::content()?;
        Ok(content
            .windows()
            .iter()
            .map(|window| {
                let frame = window.frame();
                let owner = window.owning_application();
                WindowInfo {
                    window_id: window.window_id() as u64,
                    frame: Rect::new(frame.x, frame.y, frame.width, frame.height),
                    layer: window.window_layer() as i32,
                    on_screen: window.is_on_screen(),
                    active: window.is_active(),
                    title: window.title().unwrap_or_default(),
                    owning_process_id: owner.as_ref().map(|a| a.process_id()).unwrap_or(-1),
                    owning_application_name: owner
                        .as_ref()
                        .map(|a| a.application_name())
                        .unwrap_or_default(),
                    owning_bundle_identifier: owner
                        .as_ref()
                        .map(|a| a.bundle_identifier())
                        .unwrap_or_default(),
                }
            })
            .collect())
    }

    fn displays(&self) -> Result<Vec<DisplayInfo>, EnumerationError> {
        let content = Self::content()?;
        let main_id = main_display_id();
        Ok(content
            .displays()
            .iter()
            .map(|display| {
                let frame = display.frame();
                DisplayInfo {
                    display_id: display.display_id(),
                    frame: Rect::new(frame.x, frame.y, frame.width, frame.height),
                    width: display.width(),
                    height: display.height(),
                    is_main_display: display.display_id() == main_id,
                }
            })
            .collect())
    }
}
