//! Stream abstractions shared by the engine, the controller and providers
//!
//! The engine never talks to a concrete audio host. It sees streams through
//! [`AudioStream`], receives periods through [`DataCallback`], and the
//! controller obtains streams from a [`StreamProvider`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AudioError;

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Sample format of a stream; only 32-bit float is produced by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::F32 => std::mem::size_of::<f32>(),
        }
    }
}

/// Device sharing requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingMode {
    Shared,
    Exclusive,
}

/// Performance mode requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    None,
    PowerSaving,
    LowLatency,
}

/// Lifecycle state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Started,
    Stopped,
    Closed,
    /// The host reported a fatal error for this stream
    Disconnected,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Closed | StreamState::Disconnected)
    }
}

/// What the data callback wants the host to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Continue,
    Stop,
}

/// Parameters for opening one stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub direction: Direction,
    /// `0` lets the host pick its default device
    pub device_id: i32,
    pub channel_count: u16,
    pub sample_format: SampleFormat,
    pub sharing_mode: SharingMode,
    pub performance_mode: PerformanceMode,
    /// Required rate; `None` accepts whatever the host negotiates
    pub sample_rate: Option<u32>,
}

impl StreamRequest {
    pub fn output(channel_count: u16) -> Self {
        Self {
            direction: Direction::Output,
            device_id: crate::constants::UNSPECIFIED_DEVICE_ID,
            channel_count,
            sample_format: SampleFormat::F32,
            sharing_mode: SharingMode::Exclusive,
            performance_mode: PerformanceMode::LowLatency,
            sample_rate: None,
        }
    }

    pub fn input(device_id: i32, channel_count: u16, sample_rate: u32) -> Self {
        Self {
            direction: Direction::Input,
            device_id,
            channel_count,
            sample_format: SampleFormat::F32,
            sharing_mode: SharingMode::Exclusive,
            performance_mode: PerformanceMode::LowLatency,
            sample_rate: Some(sample_rate),
        }
    }

    pub fn with_modes(mut self, sharing: SharingMode, performance: PerformanceMode) -> Self {
        self.sharing_mode = sharing;
        self.performance_mode = performance;
        self
    }
}

/// An open audio stream in one direction
///
/// Implementations are internally synchronized: control methods may be
/// called from any thread while the host runs callbacks.
pub trait AudioStream: Send + Sync {
    fn direction(&self) -> Direction;

    fn state(&self) -> StreamState;

    fn request_start(&self) -> Result<(), AudioError>;

    fn request_stop(&self) -> Result<(), AudioError>;

    /// Release host resources. Further calls are no-ops.
    fn close(&self) -> Result<(), AudioError>;

    /// Read up to `frames` interleaved frames into `buffer`.
    ///
    /// Never reads more frames than fit in `buffer`. With a zero timeout
    /// this returns immediately with whatever is available, possibly 0.
    fn read(&self, buffer: &mut [f32], frames: usize, timeout_nanos: u64)
        -> Result<usize, AudioError>;

    fn buffer_capacity_in_frames(&self) -> usize;

    fn channel_count(&self) -> u16;

    fn frames_per_burst(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::F32
    }

    fn bytes_per_frame(&self) -> usize {
        self.channel_count() as usize * self.sample_format().bytes_per_sample()
    }

    /// Current end-to-end latency estimate
    fn calculate_latency_millis(&self) -> Result<f64, AudioError>;
}

/// Per-period processing hook invoked on the output stream's audio thread
pub trait DataCallback: Send {
    /// Fill `output` (interleaved, `frames` frames) for one period
    fn on_period(&mut self, output: &mut [f32], frames: usize) -> CallbackResult;
}

/// Callback registered with a provider
pub type SharedCallback = Arc<Mutex<dyn DataCallback>>;

/// Run one period through a shared callback without blocking.
///
/// If the control thread currently holds the callback (start/stop in
/// progress) the period is rendered as silence.
pub fn dispatch_period(callback: &SharedCallback, output: &mut [f32], frames: usize) -> CallbackResult {
    match callback.try_lock() {
        Some(mut cb) => cb.on_period(output, frames),
        None => {
            output.fill(0.0);
            CallbackResult::Continue
        }
    }
}

/// Opens streams on behalf of the controller
pub trait StreamProvider {
    /// Open (but do not start) a stream.
    ///
    /// `callback` is only meaningful for output streams; input streams are
    /// read from the output callback instead.
    fn open_stream(
        &self,
        request: &StreamRequest,
        callback: Option<SharedCallback>,
    ) -> Result<Box<dyn AudioStream>, AudioError>;
}
