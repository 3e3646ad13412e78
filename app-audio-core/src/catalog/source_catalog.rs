use crate::models::error::EnumerationError;
use crate::models::sources::{AppInfo, DisplayInfo, WindowInfo};
use crate::traits::enumeration_backend::EnumerationBackend;

/// Read-only view of capturable sources.
///
/// Each query goes to the backend; nothing is cached, so two calls a
/// second apart may disagree. Failures never affect capture state.
pub struct SourceCatalog<E: EnumerationBackend> {
    backend: E,
}

impl<E: EnumerationBackend> SourceCatalog<E> {
    pub fn new(backend: E) -> Self {
        Self { backend }
    }

    pub fn list_applications(&self) -> Result<Vec<AppInfo>, EnumerationError> {
        let apps = self.backend.applications().inspect_err(|e| {
            log::warn!("Application enumeration failed: {}", e);
        })?;
        log::debug!("Enumerated {} applications", apps.len());
        Ok(apps)
    }

    pub fn list_windows(&self) -> Result<Vec<WindowInfo>, EnumerationError> {
        let windows = self.backend.windows().inspect_err(|e| {
            log::warn!("Window enumeration failed: {}", e);
        })?;
        log::debug!("Enumerated {} windows", windows.len());
        Ok(windows)
    }

    pub fn list_displays(&self) -> Result<Vec<DisplayInfo>, EnumerationError> {
        let displays = self.backend.displays().inspect_err(|e| {
            log::warn!("Display enumeration failed: {}", e);
        })?;
        log::debug!("Enumerated {} displays", displays.len());
        Ok(displays)
    }

    /// Look up one running application in a fresh snapshot.
    pub fn find_application(&self, process_id: i32) -> Result<Option<AppInfo>, EnumerationError> {
        Ok(self
            .list_applications()?
            .into_iter()
            .find(|app| app.process_id == process_id))
    }

    /// Windows owned by `process_id`, in backend order.
    pub fn windows_for_process(&self, process_id: i32) -> Result<Vec<WindowInfo>, EnumerationError> {
        let mut windows = self.list_windows()?;
        windows.retain(|w| w.owning_process_id == process_id);
        Ok(windows)
    }

    pub fn backend(&self) -> &E {
        &self.backend
    }
}
