//! Duplex sync engine
//!
//! Runs on the output stream's real-time thread. Every period it silences
//! the output, then applies the policy of the current warm-up phase. Once
//! warmed up it reads whatever input is available, amplifies it into the
//! output and leaves the rest of the period silent.
//!
//! Nothing in [`DuplexSyncEngine::on_period`] allocates, blocks or logs.
//! The scratch buffer is sized in [`DuplexSyncEngine::start`].

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::audio::buffer::ScratchBuffer;
use crate::audio::stream::{AudioStream, CallbackResult, DataCallback};
use crate::audio::warmup::{WarmupPhase, WarmupSchedule};
use crate::config::EngineConfig;
use crate::error::AudioError;

/// Lock-free session counters, readable from any thread
#[derive(Debug, Default)]
pub struct EngineStats {
    last_frame_count: AtomicUsize,
    callbacks: AtomicU64,
    frames_passed: AtomicU64,
    short_periods: AtomicU64,
    empty_drains: AtomicU64,
    phase: AtomicU8,
}

impl EngineStats {
    fn reset(&self, phase: WarmupPhase) {
        self.last_frame_count.store(0, Ordering::Relaxed);
        self.callbacks.store(0, Ordering::Relaxed);
        self.frames_passed.store(0, Ordering::Relaxed);
        self.short_periods.store(0, Ordering::Relaxed);
        self.empty_drains.store(0, Ordering::Relaxed);
        self.phase.store(phase.ordinal(), Ordering::Relaxed);
    }

    /// Frames requested by the most recent callback
    pub fn last_frame_count(&self) -> usize {
        self.last_frame_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            last_frame_count: self.last_frame_count(),
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_passed: self.frames_passed.load(Ordering::Relaxed),
            short_periods: self.short_periods.load(Ordering::Relaxed),
            empty_drains: self.empty_drains.load(Ordering::Relaxed),
            phase: phase_name(self.phase.load(Ordering::Relaxed)),
        }
    }
}

fn phase_name(ordinal: u8) -> &'static str {
    match ordinal {
        0 => "drain",
        1 => "cushion",
        2 => "discard",
        _ => "steady",
    }
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub last_frame_count: usize,
    pub callbacks: u64,
    /// Input frames copied into the output
    pub frames_passed: u64,
    /// Steady-state periods where input did not cover the whole period
    pub short_periods: u64,
    /// Drain invocations that found nothing to drain
    pub empty_drains: u64,
    pub phase: &'static str,
}

/// Copy `frames_read` frames of `input` into `output` with `gain` applied.
///
/// Only the first `frames_requested` frames of `output` are touched. Any
/// of those not covered by input are set to silence. Returns the number of
/// samples that came from input.
pub fn amplify_into(
    output: &mut [f32],
    input: &[f32],
    frames_read: usize,
    frames_requested: usize,
    samples_per_frame: usize,
    gain: f32,
) -> usize {
    let available = (frames_read * samples_per_frame).min(input.len());
    let requested = (frames_requested * samples_per_frame).min(output.len());
    let to_process = available.min(requested);

    for (out, &sample) in output[..to_process].iter_mut().zip(&input[..to_process]) {
        *out = sample * gain;
    }
    output[to_process..requested].fill(0.0);

    to_process
}

/// Warm-up state machine plus amplified passthrough
pub struct DuplexSyncEngine {
    schedule: WarmupSchedule,
    gain: f32,
    phase: WarmupPhase,
    input: Option<Weak<dyn AudioStream>>,
    output: Option<Weak<dyn AudioStream>>,
    scratch: ScratchBuffer,
    stats: Arc<EngineStats>,
}

impl DuplexSyncEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let schedule = WarmupSchedule::from(config);
        Self {
            schedule,
            gain: config.gain,
            phase: schedule.first_phase(),
            input: None,
            output: None,
            scratch: ScratchBuffer::new(),
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Attach (or with `None`, detach) the stream to read input from
    pub fn set_input_stream(&mut self, stream: Option<&Arc<dyn AudioStream>>) {
        self.input = stream.map(Arc::downgrade);
    }

    /// Attach (or with `None`, detach) the stream being rendered to
    pub fn set_output_stream(&mut self, stream: Option<&Arc<dyn AudioStream>>) {
        self.output = stream.map(Arc::downgrade);
    }

    pub fn phase(&self) -> WarmupPhase {
        self.phase
    }

    /// Shared handle to the session counters
    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    /// Scratch capacity in samples
    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Begin a session: reset warm-up, size the scratch buffer, start input
    /// then output.
    pub fn start(&mut self) -> Result<(), AudioError> {
        let input = upgrade(&self.input).ok_or(AudioError::NotAttached("input"))?;
        let output = upgrade(&self.output).ok_or(AudioError::NotAttached("output"))?;

        if input.channel_count() != output.channel_count() {
            return Err(AudioError::UnsupportedFormat(format!(
                "input has {} channels, output has {}",
                input.channel_count(),
                output.channel_count()
            )));
        }

        self.phase = self.schedule.first_phase();
        self.stats.reset(self.phase);

        let needed = output.buffer_capacity_in_frames() * output.channel_count() as usize;
        if self.scratch.ensure_capacity(needed) {
            tracing::debug!("Scratch buffer grown to {} samples", needed);
        }

        input.request_start()?;
        output.request_start()?;

        tracing::info!(
            "Engine session started: gain {}, warm-up {}/{}/{} callbacks",
            self.gain,
            self.schedule.drain,
            self.schedule.cushion,
            self.schedule.discard
        );
        Ok(())
    }

    /// Request both streams to stop. Safe to call without attached streams.
    pub fn stop(&mut self) {
        if let Some(output) = upgrade(&self.output) {
            if let Err(e) = output.request_stop() {
                tracing::warn!("Failed to stop output stream: {}", e);
            }
        }
        if let Some(input) = upgrade(&self.input) {
            if let Err(e) = input.request_stop() {
                tracing::warn!("Failed to stop input stream: {}", e);
            }
        }

        let stats = self.stats.snapshot();
        if let WarmupPhase::Drain { remaining } = self.phase {
            if stats.callbacks > 0 {
                tracing::warn!(
                    "Session stopped while still draining ({} to go, {} empty drains): input may never have started",
                    remaining,
                    stats.empty_drains
                );
            }
        }
        tracing::debug!("Engine session stopped: {:?}", stats);
    }

    /// Read until the input has nothing left. Errors end the loop quietly
    /// since the input may simply not be running yet.
    fn drain_input(&mut self, input: &dyn AudioStream, frames: usize) -> usize {
        let mut total = 0;
        loop {
            match input.read(self.scratch.as_mut_slice(), frames, 0) {
                Ok(0) | Err(_) => break,
                Ok(read) => total += read,
            }
        }
        total
    }
}

fn upgrade(stream: &Option<Weak<dyn AudioStream>>) -> Option<Arc<dyn AudioStream>> {
    stream.as_ref().and_then(Weak::upgrade)
}

impl DataCallback for DuplexSyncEngine {
    fn on_period(&mut self, output: &mut [f32], frames: usize) -> CallbackResult {
        self.stats.last_frame_count.store(frames, Ordering::Relaxed);
        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);

        output.fill(0.0);

        let (Some(input), Some(out_stream)) = (upgrade(&self.input), upgrade(&self.output))
        else {
            return CallbackResult::Continue;
        };

        let mut result = CallbackResult::Continue;
        let made_progress = match self.phase {
            WarmupPhase::Drain { .. } => {
                let drained = self.drain_input(&*input, frames);
                if drained == 0 {
                    self.stats.empty_drains.fetch_add(1, Ordering::Relaxed);
                }
                drained > 0
            }
            WarmupPhase::Cushion { .. } => true,
            WarmupPhase::Discard { .. } => {
                if input.read(self.scratch.as_mut_slice(), frames, 0).is_err() {
                    result = CallbackResult::Stop;
                }
                true
            }
            WarmupPhase::Steady => {
                match input.read(self.scratch.as_mut_slice(), frames, 0) {
                    Ok(frames_read) => {
                        let samples_per_frame = out_stream.channel_count() as usize;
                        let passed = amplify_into(
                            output,
                            self.scratch.as_slice(),
                            frames_read,
                            frames,
                            samples_per_frame,
                            self.gain,
                        );
                        self.stats
                            .frames_passed
                            .fetch_add((passed / samples_per_frame.max(1)) as u64, Ordering::Relaxed);
                        if frames_read < frames {
                            self.stats.short_periods.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(_) => result = CallbackResult::Stop,
                }
                true
            }
        };

        self.phase = self.schedule.advance(self.phase, made_progress);
        self.stats.phase.store(self.phase.ordinal(), Ordering::Relaxed);

        if result == CallbackResult::Stop {
            let _ = input.request_stop();
        }
        result
    }
}
