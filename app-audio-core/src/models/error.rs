use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::target::CaptureTarget;

/// Rejections produced by [`validate`](crate::models::config::validate).
///
/// Caller-correctable; returned synchronously with no session state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported sample rate: {0} Hz")]
    InvalidSampleRate(i64),

    #[error("unsupported channel count: {0}")]
    InvalidChannelCount(i64),

    #[error("buffer size must not be negative: {0}")]
    InvalidBufferSize(i64),

    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Failure of one catalog query. Never touches capture state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnumerationError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("enumeration backend unavailable: {0}")]
    Unavailable(String),
}

/// What a [`CaptureBackend`](crate::traits::capture_backend::CaptureBackend)
/// reports when it cannot begin capturing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("capture source not found: {0}")]
    SourceNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Reason attached to [`CaptureError::CaptureStartFailed`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartFailure {
    #[error("permission denied")]
    PermissionDenied,

    #[error("capture source not found: {0}")]
    SourceNotFound(String),

    #[error("backend did not acknowledge start in time")]
    Timeout,

    #[error("stopped before the backend acknowledged start")]
    Cancelled,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("failed to spawn {0} thread")]
    Spawn(String),
}

impl From<BackendError> for StartFailure {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied => Self::PermissionDenied,
            BackendError::SourceNotFound(source) => Self::SourceNotFound(source),
            BackendError::Other(reason) => Self::Backend(reason),
        }
    }
}

/// Synchronous errors returned by the start operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("a capture session is already active")]
    AlreadyCapturing,

    #[error("capture failed to start: {0}")]
    CaptureStartFailed(#[from] StartFailure),
}

/// A raw batch that violates the [`AudioSample`](crate::models::sample::AudioSample) invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("channel count must be at least 1")]
    ZeroChannels,

    #[error("{len} samples is not a whole number of {channels}-channel frames")]
    PartialFrame { len: usize, channels: u16 },
}

/// Out-of-band notification that an active capture terminated without
/// an explicit stop. Delivered through
/// [`CaptureDelegate`](crate::traits::capture_delegate::CaptureDelegate),
/// never through the sample callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureEndedUnexpectedly {
    pub session_id: Uuid,
    pub target: CaptureTarget,
    pub reason: String,
}
