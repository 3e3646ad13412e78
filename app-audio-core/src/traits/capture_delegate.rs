use crate::models::error::CaptureEndedUnexpectedly;
use crate::models::state::CaptureState;

/// Event delegate for capture session notifications.
///
/// Kept apart from the sample callback: audio flows through the callback,
/// lifecycle events flow through here. Methods may be called from the
/// caller's thread or a backend thread; implementations should marshal to
/// a UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called when an active capture stops without `stop_capture`.
    fn on_capture_ended_unexpectedly(&self, event: &CaptureEndedUnexpectedly);
}
