//! Scripted streams and provider for tests

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::stream::{
    AudioStream, Direction, SharedCallback, StreamProvider, StreamRequest, StreamState,
};
use crate::error::AudioError;

struct MockInner {
    direction: Direction,
    channels: u16,
    capacity_frames: usize,
    burst_frames: usize,
    sample_rate: u32,
    state: Mutex<StreamState>,
    pending: Mutex<VecDeque<f32>>,
    fail_reads: AtomicBool,
    fail_start: AtomicBool,
    latency_ms: Mutex<Option<f64>>,
    read_calls: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

/// In-memory stream whose input is fed by the test
#[derive(Clone)]
pub struct MockStream {
    inner: Arc<MockInner>,
}

impl MockStream {
    pub fn new(direction: Direction, channels: u16, capacity_frames: usize) -> Self {
        Self {
            inner: Arc::new(MockInner {
                direction,
                channels,
                capacity_frames,
                burst_frames: capacity_frames / 2,
                sample_rate: 48_000,
                state: Mutex::new(StreamState::Open),
                pending: Mutex::new(VecDeque::new()),
                fail_reads: AtomicBool::new(false),
                fail_start: AtomicBool::new(false),
                latency_ms: Mutex::new(None),
                read_calls: AtomicUsize::new(0),
                start_calls: AtomicUsize::new(0),
                stop_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn input(channels: u16, capacity_frames: usize) -> Self {
        Self::new(Direction::Input, channels, capacity_frames)
    }

    pub fn output(channels: u16, capacity_frames: usize) -> Self {
        Self::new(Direction::Output, channels, capacity_frames)
    }

    /// Share this stream as a trait object
    pub fn handle(&self) -> Arc<dyn AudioStream> {
        Arc::new(self.clone())
    }

    /// Make `frames` frames of `value` available to the next reads
    pub fn push_frames(&self, frames: usize, value: f32) {
        let samples = frames * self.inner.channels as usize;
        self.inner
            .pending
            .lock()
            .extend(std::iter::repeat(value).take(samples));
    }

    pub fn pending_frames(&self) -> usize {
        self.inner.pending.lock().len() / self.inner.channels as usize
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.inner.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency_ms: Option<f64>) {
        *self.inner.latency_ms.lock() = latency_ms;
    }

    pub fn read_calls(&self) -> usize {
        self.inner.read_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.inner.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.inner.stop_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }
}

impl AudioStream for MockStream {
    fn direction(&self) -> Direction {
        self.inner.direction
    }

    fn state(&self) -> StreamState {
        *self.inner.state.lock()
    }

    fn request_start(&self) -> Result<(), AudioError> {
        self.inner.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_start.load(Ordering::SeqCst) {
            return Err(AudioError::CpalError("start refused".to_string()));
        }
        let mut state = self.inner.state.lock();
        if state.is_terminal() {
            return Err(AudioError::StreamClosed);
        }
        *state = StreamState::Started;
        Ok(())
    }

    fn request_stop(&self) -> Result<(), AudioError> {
        self.inner.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.state.lock();
        if !state.is_terminal() {
            *state = StreamState::Stopped;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), AudioError> {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.inner.state.lock() = StreamState::Closed;
        Ok(())
    }

    fn read(
        &self,
        buffer: &mut [f32],
        frames: usize,
        _timeout_nanos: u64,
    ) -> Result<usize, AudioError> {
        self.inner.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(AudioError::Disconnected("scripted failure".to_string()));
        }
        if self.state() == StreamState::Closed {
            return Err(AudioError::StreamClosed);
        }

        let channels = self.inner.channels as usize;
        let mut pending = self.inner.pending.lock();
        let frames = frames
            .min(buffer.len() / channels)
            .min(pending.len() / channels);
        for (slot, sample) in buffer[..frames * channels]
            .iter_mut()
            .zip(pending.drain(..frames * channels))
        {
            *slot = sample;
        }
        Ok(frames)
    }

    fn buffer_capacity_in_frames(&self) -> usize {
        self.inner.capacity_frames
    }

    fn channel_count(&self) -> u16 {
        self.inner.channels
    }

    fn frames_per_burst(&self) -> usize {
        self.inner.burst_frames
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    fn calculate_latency_millis(&self) -> Result<f64, AudioError> {
        (*self.inner.latency_ms.lock()).ok_or(AudioError::LatencyUnavailable)
    }
}

/// Provider handing out [`MockStream`]s and recording every request
#[derive(Default)]
pub struct MockProvider {
    pub fail_output: AtomicBool,
    pub fail_input: AtomicBool,
    /// Opened input streams refuse `request_start`
    pub fail_input_start: AtomicBool,
    requests: Mutex<Vec<StreamRequest>>,
    opened: Mutex<Vec<MockStream>>,
    callback: Mutex<Option<SharedCallback>>,
    capacity_frames: usize,
}

impl MockProvider {
    pub fn new(capacity_frames: usize) -> Self {
        Self {
            capacity_frames,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }

    /// Every stream opened so far, in order
    pub fn opened(&self) -> Vec<MockStream> {
        self.opened.lock().clone()
    }

    pub fn stream(&self, direction: Direction) -> Option<MockStream> {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|s| s.direction() == direction)
            .cloned()
    }

    /// Callback registered with the most recent output stream
    pub fn callback(&self) -> Option<SharedCallback> {
        self.callback.lock().clone()
    }
}

impl StreamProvider for MockProvider {
    fn open_stream(
        &self,
        request: &StreamRequest,
        callback: Option<SharedCallback>,
    ) -> Result<Box<dyn AudioStream>, AudioError> {
        self.requests.lock().push(request.clone());

        let fail = match request.direction {
            Direction::Output => self.fail_output.load(Ordering::SeqCst),
            Direction::Input => self.fail_input.load(Ordering::SeqCst),
        };
        if fail {
            return Err(AudioError::DeviceNotFound(format!(
                "device {}",
                request.device_id
            )));
        }

        let stream = MockStream::new(
            request.direction,
            request.channel_count,
            self.capacity_frames,
        );
        if request.direction == Direction::Input && self.fail_input_start.load(Ordering::SeqCst) {
            stream.set_fail_start(true);
        }
        if callback.is_some() {
            *self.callback.lock() = callback;
        }
        self.opened.lock().push(stream.clone());
        Ok(Box::new(stream))
    }
}
