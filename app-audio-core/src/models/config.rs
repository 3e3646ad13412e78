use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Sample rates accepted by [`validate`], in Hz.
pub const SUPPORTED_SAMPLE_RATES: RangeInclusive<i64> = 8_000..=192_000;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_CHANNELS: u16 = 2;

/// Validated audio configuration for a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// 1 = mono, 2 = stereo interleaved (default: 2).
    pub channels: u16,

    /// Frames per backend buffer, 0 lets the system choose (default: 0).
    pub buffer_size: u32,

    /// Hide the cursor if the backend also produces video (default: true).
    pub exclude_cursor: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            buffer_size: 0,
            exclude_cursor: true,
        }
    }
}

/// Caller-supplied configuration before defaulting and validation.
///
/// Integer fields are signed so out-of-range input such as `-1` reaches
/// validation as a typed error rather than failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawCaptureConfig {
    pub sample_rate: Option<i64>,
    pub channels: Option<i64>,
    pub buffer_size: Option<i64>,
    pub exclude_cursor: Option<bool>,
}

impl RawCaptureConfig {
    /// Parse a JSON object such as `{"sampleRate": 44100}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    pub fn validate(&self) -> Result<CaptureConfig, ConfigError> {
        validate(*self)
    }
}

impl From<CaptureConfig> for RawCaptureConfig {
    fn from(config: CaptureConfig) -> Self {
        Self {
            sample_rate: Some(config.sample_rate.into()),
            channels: Some(config.channels.into()),
            buffer_size: Some(config.buffer_size.into()),
            exclude_cursor: Some(config.exclude_cursor),
        }
    }
}

/// Apply defaults for unset fields, then reject unsupported values.
///
/// Checks run in field order: sample rate, channels, buffer size.
pub fn validate(raw: RawCaptureConfig) -> Result<CaptureConfig, ConfigError> {
    let defaults = CaptureConfig::default();

    let sample_rate = match raw.sample_rate {
        None => defaults.sample_rate,
        Some(rate) if SUPPORTED_SAMPLE_RATES.contains(&rate) => rate as u32,
        Some(rate) => return Err(ConfigError::InvalidSampleRate(rate)),
    };

    let channels = match raw.channels {
        None => defaults.channels,
        Some(n @ (1 | 2)) => n as u16,
        Some(n) => return Err(ConfigError::InvalidChannelCount(n)),
    };

    let buffer_size = match raw.buffer_size {
        None => defaults.buffer_size,
        Some(size) if size < 0 => return Err(ConfigError::InvalidBufferSize(size)),
        Some(size) => u32::try_from(size).map_err(|_| ConfigError::InvalidBufferSize(size))?,
    };

    Ok(CaptureConfig {
        sample_rate,
        channels,
        buffer_size,
        exclude_cursor: raw.exclude_cursor.unwrap_or(defaults.exclude_cursor),
    })
}

/// Operational settings for a [`CaptureSession`](crate::session::capture_session::CaptureSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Batches held between producer and consumer before drop-oldest kicks in.
    pub queue_capacity: usize,

    /// How long `start` waits for the backend to acknowledge.
    pub start_timeout: Duration,

    /// How long `stop` waits for the backend before treating it as stopped.
    pub stop_timeout: Duration,
}

impl SessionOptions {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawSessionOptions =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let defaults = Self::default();
        Ok(Self {
            queue_capacity: raw.queue_capacity.unwrap_or(defaults.queue_capacity),
            start_timeout: raw
                .start_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.start_timeout),
            stop_timeout: raw
                .stop_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stop_timeout),
        })
    }

    /// Queue capacity with the zero case lifted to a single slot.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawSessionOptions {
    queue_capacity: Option<usize>,
    start_timeout_ms: Option<u64>,
    stop_timeout_ms: Option<u64>,
}
