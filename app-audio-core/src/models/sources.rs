use serde::{Deserialize, Serialize};

/// Rectangle in floating-point display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// A running application that can be captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub process_id: i32,
    pub bundle_identifier: String,
    pub application_name: String,
}

/// An on-screen (or off-screen) window that can be captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub window_id: u64,
    pub frame: Rect,
    pub layer: i32,
    pub on_screen: bool,
    pub active: bool,
    pub title: String,
    pub owning_process_id: i32,
    pub owning_application_name: String,
    pub owning_bundle_identifier: String,
}

/// A display that can be captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub display_id: u32,
    pub frame: Rect,
    pub width: u32,
    pub height: u32,
    pub is_main_display: bool,
}
