use std::sync::Arc;

use super::error::SampleError;

/// A batch of interleaved f32 audio delivered to the caller.
///
/// Immutable once constructed. The callback receives it by value, so the
/// caller owns the data outright; nothing in the pipeline keeps a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    data: Vec<f32>,
    sample_rate: u32,
    channel_count: u16,
    timestamp: f64,
}

impl AudioSample {
    /// Build a batch, checking that `data` holds whole frames.
    pub fn new(
        data: Vec<f32>,
        sample_rate: u32,
        channel_count: u16,
        timestamp: f64,
    ) -> Result<Self, SampleError> {
        if sample_rate == 0 {
            return Err(SampleError::ZeroSampleRate);
        }
        if channel_count == 0 {
            return Err(SampleError::ZeroChannels);
        }
        if data.len() % channel_count as usize != 0 {
            return Err(SampleError::PartialFrame {
                len: data.len(),
                channels: channel_count,
            });
        }
        Ok(Self {
            data,
            sample_rate,
            channel_count,
            timestamp,
        })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Seconds since the start of the session that produced this batch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Number of interleaved frames in the batch.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Consumer callback invoked once per delivered batch, in arrival order.
///
/// Runs on the session's delivery thread, never on the platform audio thread.
pub type AudioSampleCallback = Arc<dyn Fn(AudioSample) + Send + Sync + 'static>;
