use crate::models::error::EnumerationError;
use crate::models::sources::{AppInfo, DisplayInfo, WindowInfo};

/// Platform source of capturable applications, windows, and displays.
///
/// Every call returns a fresh snapshot of system state; implementations
/// must not cache across calls.
pub trait EnumerationBackend: Send + Sync {
    fn applications(&self) -> Result<Vec<AppInfo>, EnumerationError>;

    fn windows(&self) -> Result<Vec<WindowInfo>, EnumerationError>;

    fn displays(&self) -> Result<Vec<DisplayInfo>, EnumerationError>;
}
