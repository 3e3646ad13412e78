use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::CaptureConfig;
use super::target::CaptureTarget;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → capturing → stopping → idle
///           ↓           ↓
///          idle        idle   (start failure / unexpected termination)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Starting,
    Capturing,
    Stopping,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// True only while samples are flowing; false during the
    /// `Starting` and `Stopping` hand-offs.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    /// Whether a session occupies the controller's single capture slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Capturing)
    }
}

/// Identity of one start-to-stop capture lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub target: CaptureTarget,
    pub config: CaptureConfig,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(target: CaptureTarget, config: CaptureConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target,
            config,
            started_at: Utc::now(),
        }
    }
}
