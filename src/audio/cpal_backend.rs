//! cpal-backed stream provider
//!
//! Each opened stream gets a keeper thread that builds the cpal stream and
//! then owns it, since `cpal::Stream` cannot be moved between threads on
//! every platform. The control side talks to the keeper over a small
//! command channel.
//!
//! Output streams run the registered [`DataCallback`] on cpal's audio
//! thread. Input streams push captured samples into a lock-free
//! [`SampleQueue`] that [`AudioStream::read`] pops from.
//!
//! [`DataCallback`]: crate::audio::stream::DataCallback

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer::SampleQueue;
use crate::audio::device::find_device;
use crate::audio::stream::{
    dispatch_period, AudioStream, CallbackResult, Direction, SharedCallback, StreamProvider,
    StreamRequest, StreamState,
};
use crate::config::StreamSettings;
use crate::error::AudioError;

/// Opens streams on the default cpal host
pub struct CpalStreamProvider {
    settings: StreamSettings,
}

impl CpalStreamProvider {
    pub fn new(settings: StreamSettings) -> Self {
        Self { settings }
    }
}

impl StreamProvider for CpalStreamProvider {
    fn open_stream(
        &self,
        request: &StreamRequest,
        callback: Option<SharedCallback>,
    ) -> Result<Box<dyn AudioStream>, AudioError> {
        let device = find_device(request.direction, request.device_id)?;
        let supported = match request.direction {
            Direction::Input => device.default_input_config(),
            Direction::Output => device.default_output_config(),
        }
        .map_err(|e| AudioError::CpalError(e.to_string()))?;

        let sample_rate = match request.direction {
            Direction::Input => request.sample_rate,
            Direction::Output => request.sample_rate.or(self.settings.default_sample_rate),
        }
        .unwrap_or(supported.sample_rate().0);

        let burst = self.settings.frames_per_burst;
        let config = cpal::StreamConfig {
            channels: request.channel_count,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: match burst {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        // cpal negotiates sharing and performance itself
        tracing::debug!(
            "Opening {:?} stream on device {} ({:?} sharing, {:?} performance requested, native format {:?})",
            request.direction,
            request.device_id,
            request.sharing_mode,
            request.performance_mode,
            supported.sample_format()
        );

        let capacity_frames = self
            .settings
            .buffer_capacity_frames
            .max(burst.unwrap_or(0)) as usize;

        let stream = CpalStream::open(device, request.direction, config, capacity_frames, callback)?;
        Ok(Box::new(stream))
    }
}

enum StreamCommand {
    Start,
    Stop,
    Close,
}

/// State shared between the control side and cpal's callbacks
struct StreamShared {
    state: AtomicU8,
    latency_bits: AtomicU64,
    observed_burst: AtomicUsize,
    queue: Option<SampleQueue>,
}

impl StreamShared {
    fn new(queue: Option<SampleQueue>) -> Self {
        Self {
            state: AtomicU8::new(encode_state(StreamState::Open)),
            latency_bits: AtomicU64::new(f64::NAN.to_bits()),
            observed_burst: AtomicUsize::new(0),
            queue,
        }
    }

    fn state(&self) -> StreamState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(encode_state(state), Ordering::Release);
    }

    fn record_latency(&self, latency: Option<Duration>) {
        if let Some(latency) = latency {
            let ms = latency.as_secs_f64() * 1000.0;
            self.latency_bits.store(ms.to_bits(), Ordering::Relaxed);
        }
    }

    fn latency_ms(&self) -> Option<f64> {
        let ms = f64::from_bits(self.latency_bits.load(Ordering::Relaxed));
        (!ms.is_nan()).then_some(ms)
    }
}

fn encode_state(state: StreamState) -> u8 {
    match state {
        StreamState::Open => 0,
        StreamState::Started => 1,
        StreamState::Stopped => 2,
        StreamState::Closed => 3,
        StreamState::Disconnected => 4,
    }
}

fn decode_state(value: u8) -> StreamState {
    match value {
        0 => StreamState::Open,
        1 => StreamState::Started,
        2 => StreamState::Stopped,
        3 => StreamState::Closed,
        _ => StreamState::Disconnected,
    }
}

/// One cpal stream plus the thread that keeps it alive
pub struct CpalStream {
    direction: Direction,
    channels: u16,
    sample_rate: u32,
    capacity_frames: usize,
    requested_burst: Option<u32>,
    shared: Arc<StreamShared>,
    commands: Sender<StreamCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CpalStream {
    fn open(
        device: cpal::Device,
        direction: Direction,
        config: cpal::StreamConfig,
        capacity_frames: usize,
        callback: Option<SharedCallback>,
    ) -> Result<Self, AudioError> {
        let queue = match direction {
            Direction::Input => Some(SampleQueue::new(capacity_frames, config.channels)),
            Direction::Output => None,
        };
        let shared = Arc::new(StreamShared::new(queue));
        let (command_tx, command_rx) = bounded::<StreamCommand>(8);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let thread_shared = shared.clone();
        let thread_config = config.clone();
        let self_stop = command_tx.clone();
        let label = match direction {
            Direction::Input => "input",
            Direction::Output => "output",
        };

        let handle = thread::Builder::new()
            .name(format!("cpal-{}", label))
            .spawn(move || {
                let built = match direction {
                    Direction::Input => build_input(&device, &thread_config, thread_shared.clone()),
                    Direction::Output => build_output(
                        &device,
                        &thread_config,
                        thread_shared.clone(),
                        callback,
                        self_stop,
                    ),
                };

                let stream = match built {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for command in command_rx.iter() {
                    match command {
                        StreamCommand::Start => {
                            if let Err(e) = stream.play() {
                                tracing::error!("Failed to start {} stream: {}", label, e);
                                thread_shared.set_state(StreamState::Disconnected);
                            }
                        }
                        StreamCommand::Stop => {
                            if let Err(e) = stream.pause() {
                                tracing::warn!("Failed to pause {} stream: {}", label, e);
                            }
                        }
                        StreamCommand::Close => break,
                    }
                }
                // Stream is dropped here, releasing the device
            })
            .map_err(|e| AudioError::StreamOpen(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamOpen(format!(
                    "{} stream thread exited during setup",
                    label
                )));
            }
        }

        Ok(Self {
            direction,
            channels: config.channels,
            sample_rate: config.sample_rate.0,
            capacity_frames,
            requested_burst: match config.buffer_size {
                cpal::BufferSize::Fixed(frames) => Some(frames),
                cpal::BufferSize::Default => None,
            },
            shared,
            commands: command_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Input frames dropped because nobody read the input fast enough
    fn overflow_count(&self) -> usize {
        self.shared.queue.as_ref().map_or(0, |q| q.overflow_count())
    }

    fn send(&self, command: StreamCommand) -> Result<(), AudioError> {
        self.commands
            .send(command)
            .map_err(|_| AudioError::Disconnected("stream thread has exited".to_string()))
    }
}

/// Queue a pause without blocking, so it is safe from a data callback.
/// A full channel already holds pending commands for the keeper thread.
fn post_stop(commands: &Sender<StreamCommand>) -> Result<(), AudioError> {
    match commands.try_send(StreamCommand::Stop) {
        Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
        Err(TrySendError::Disconnected(_)) => Err(AudioError::Disconnected(
            "stream thread has exited".to_string(),
        )),
    }
}

fn build_output(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<StreamShared>,
    callback: Option<SharedCallback>,
    self_stop: Sender<StreamCommand>,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels.max(1) as usize;
    let err_shared = shared.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                if shared.state() != StreamState::Started {
                    data.fill(0.0);
                    return;
                }

                let frames = data.len() / channels;
                shared.observed_burst.store(frames, Ordering::Relaxed);
                let timestamp = info.timestamp();
                shared.record_latency(timestamp.playback.duration_since(&timestamp.callback));

                let result = match &callback {
                    Some(callback) => dispatch_period(callback, data, frames),
                    None => {
                        data.fill(0.0);
                        CallbackResult::Continue
                    }
                };
                if result == CallbackResult::Stop {
                    shared.set_state(StreamState::Stopped);
                    let _ = post_stop(&self_stop);
                }
            },
            move |err| {
                tracing::error!("Output stream error: {}", err);
                err_shared.set_state(StreamState::Disconnected);
            },
            None,
        )
        .map_err(|e| AudioError::StreamOpen(e.to_string()))
}

fn build_input(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<StreamShared>,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels.max(1) as usize;
    let err_shared = shared.clone();

    device
        .build_input_stream(
            config,
            move |data: &[f32], info: &cpal::InputCallbackInfo| {
                shared
                    .observed_burst
                    .store(data.len() / channels, Ordering::Relaxed);
                let timestamp = info.timestamp();
                shared.record_latency(timestamp.callback.duration_since(&timestamp.capture));

                if let Some(queue) = &shared.queue {
                    queue.push_slice(data);
                }
            },
            move |err| {
                tracing::error!("Input stream error: {}", err);
                err_shared.set_state(StreamState::Disconnected);
            },
            None,
        )
        .map_err(|e| AudioError::StreamOpen(e.to_string()))
}

impl AudioStream for CpalStream {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn state(&self) -> StreamState {
        self.shared.state()
    }

    fn request_start(&self) -> Result<(), AudioError> {
        if self.state().is_terminal() {
            return Err(AudioError::StreamClosed);
        }
        self.send(StreamCommand::Start)?;
        self.shared.set_state(StreamState::Started);
        Ok(())
    }

    fn request_stop(&self) -> Result<(), AudioError> {
        if self.state().is_terminal() {
            return Ok(());
        }
        self.shared.set_state(StreamState::Stopped);
        post_stop(&self.commands)
    }

    fn close(&self) -> Result<(), AudioError> {
        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };
        let _ = self.commands.send(StreamCommand::Close);
        if handle.join().is_err() {
            tracing::warn!("{:?} stream thread panicked", self.direction);
        }
        self.shared.set_state(StreamState::Closed);

        let dropped = self.overflow_count();
        if dropped > 0 {
            tracing::warn!("{:?} stream dropped {} frames on overflow", self.direction, dropped);
        }
        Ok(())
    }

    fn read(
        &self,
        buffer: &mut [f32],
        frames: usize,
        timeout_nanos: u64,
    ) -> Result<usize, AudioError> {
        let Some(queue) = &self.shared.queue else {
            return Err(AudioError::Read("not an input stream".to_string()));
        };

        match self.state() {
            StreamState::Closed => return Err(AudioError::StreamClosed),
            StreamState::Disconnected => {
                return Err(AudioError::Disconnected("input device failed".to_string()))
            }
            _ => {}
        }

        let read = queue.pop_frames(buffer, frames);
        if read > 0 || timeout_nanos == 0 {
            return Ok(read);
        }

        let deadline = Instant::now() + Duration::from_nanos(timeout_nanos);
        while Instant::now() < deadline {
            thread::sleep(Duration::from_micros(100));
            let read = queue.pop_frames(buffer, frames);
            if read > 0 {
                return Ok(read);
            }
        }
        Ok(0)
    }

    fn buffer_capacity_in_frames(&self) -> usize {
        self.capacity_frames
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn frames_per_burst(&self) -> usize {
        match self.requested_burst {
            Some(frames) => frames as usize,
            None => self.shared.observed_burst.load(Ordering::Relaxed),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn calculate_latency_millis(&self) -> Result<f64, AudioError> {
        if self.state() != StreamState::Started {
            return Err(AudioError::StreamNotStarted);
        }
        self.shared.latency_ms().ok_or(AudioError::LatencyUnavailable)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
