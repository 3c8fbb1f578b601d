//! Stream lifecycle controller
//!
//! Owns the input and output streams for one streaming session, opens them
//! in the right order through a [`StreamProvider`], hands them to the
//! [`DuplexSyncEngine`] and tears everything down again on stop.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::engine::{DuplexSyncEngine, EngineStats, EngineStatsSnapshot};
use crate::audio::stream::{AudioStream, SharedCallback, StreamProvider, StreamRequest};
use crate::audio::warmup::WarmupPhase;
use crate::config::{AppConfig, StreamSettings};
use crate::constants::LATENCY_UNAVAILABLE;
use crate::error::{AudioError, Result};

/// Start/stop sequencing and diagnostics for a duplex session
pub struct StreamLifecycleController<P: StreamProvider> {
    provider: P,
    settings: StreamSettings,
    input_device_id: i32,
    engine: Arc<Mutex<DuplexSyncEngine>>,
    stats: Arc<EngineStats>,
    input: Option<Arc<dyn AudioStream>>,
    output: Option<Arc<dyn AudioStream>>,
}

impl<P: StreamProvider> StreamLifecycleController<P> {
    pub fn new(provider: P, config: &AppConfig) -> Self {
        let engine = DuplexSyncEngine::new(&config.engine);
        let stats = engine.stats();
        Self {
            provider,
            settings: config.stream.clone(),
            input_device_id: config.input_device_id,
            engine: Arc::new(Mutex::new(engine)),
            stats,
            input: None,
            output: None,
        }
    }

    /// Choose the input device for the next `start`
    pub fn configure(&mut self, input_device_id: i32) {
        self.input_device_id = input_device_id;
    }

    pub fn input_device_id(&self) -> i32 {
        self.input_device_id
    }

    pub fn is_running(&self) -> bool {
        self.output.is_some()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Open output, then input at the output's sample rate, then start the
    /// engine. Nothing stays open if any step fails.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(AudioError::AlreadyRunning.into());
        }

        let channels = self.settings.channel_count;
        let modes = (self.settings.sharing_mode, self.settings.performance_mode);

        let callback: SharedCallback = self.engine.clone();
        let output_request = StreamRequest::output(channels).with_modes(modes.0, modes.1);
        let output: Arc<dyn AudioStream> = self
            .provider
            .open_stream(&output_request, Some(callback))
            .map_err(|e| {
                tracing::error!("Failed to open output stream: {}", e);
                e
            })?
            .into();

        let sample_rate = output.sample_rate();
        tracing::info!(
            "Output stream open: {}Hz, {} channels, burst {} frames, capacity {} frames",
            sample_rate,
            output.channel_count(),
            output.frames_per_burst(),
            output.buffer_capacity_in_frames()
        );

        let input_request = StreamRequest::input(self.input_device_id, channels, sample_rate)
            .with_modes(modes.0, modes.1);
        let input: Arc<dyn AudioStream> = match self.provider.open_stream(&input_request, None) {
            Ok(stream) => stream.into(),
            Err(e) => {
                tracing::error!(
                    "Failed to open input stream on device {}: {}",
                    self.input_device_id,
                    e
                );
                close_stream(&*output, "output");
                return Err(e.into());
            }
        };

        {
            let mut engine = self.engine.lock();
            engine.set_input_stream(Some(&input));
            engine.set_output_stream(Some(&output));

            if let Err(e) = engine.start() {
                tracing::error!("Failed to start engine session: {}", e);
                engine.stop();
                engine.set_output_stream(None);
                engine.set_input_stream(None);
                drop(engine);
                close_stream(&*output, "output");
                close_stream(&*input, "input");
                return Err(e.into());
            }
        }

        self.input = Some(input);
        self.output = Some(output);
        tracing::info!("Streaming from input device {}", self.input_device_id);
        Ok(())
    }

    /// Stop the engine and close both streams. No-op without a session.
    pub fn stop(&mut self) {
        if self.input.is_none() && self.output.is_none() {
            return;
        }

        let mut engine = self.engine.lock();
        engine.stop();

        if let Some(output) = self.output.take() {
            close_stream(&*output, "output");
        }
        engine.set_output_stream(None);

        if let Some(input) = self.input.take() {
            close_stream(&*input, "input");
        }
        engine.set_input_stream(None);

        tracing::info!("Streaming stopped");
    }

    pub fn query_input_burst_frames(&self) -> i32 {
        burst_frames(self.input.as_deref())
    }

    pub fn query_output_burst_frames(&self) -> i32 {
        burst_frames(self.output.as_deref())
    }

    /// Input latency in ms, or `-1.0` if it cannot be computed right now
    pub fn query_input_latency_ms(&self) -> f64 {
        latency_ms(self.input.as_deref())
    }

    /// Output latency in ms, or `-1.0` if it cannot be computed right now
    pub fn query_output_latency_ms(&self) -> f64 {
        latency_ms(self.output.as_deref())
    }

    /// Frames requested by the most recent callback
    pub fn query_last_frame_count(&self) -> i32 {
        frames_to_i32(self.stats.last_frame_count())
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Current warm-up phase. Briefly locks the engine; not for the audio thread.
    pub fn phase(&self) -> WarmupPhase {
        self.engine.lock().phase()
    }
}

impl<P: StreamProvider> Drop for StreamLifecycleController<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn close_stream(stream: &dyn AudioStream, label: &str) {
    if let Err(e) = stream.request_stop() {
        tracing::warn!("Failed to stop {} stream: {}", label, e);
    }
    if let Err(e) = stream.close() {
        tracing::warn!("Failed to close {} stream: {}", label, e);
    }
}

fn burst_frames(stream: Option<&dyn AudioStream>) -> i32 {
    stream.map_or(0, |s| frames_to_i32(s.frames_per_burst()))
}

/// Frame counts past `i32::MAX` saturate
fn frames_to_i32(frames: usize) -> i32 {
    i32::try_from(frames).unwrap_or(i32::MAX)
}

fn latency_ms(stream: Option<&dyn AudioStream>) -> f64 {
    match stream.map(|s| s.calculate_latency_millis()) {
        Some(Ok(latency)) => latency,
        Some(Err(e)) => {
            tracing::debug!("Latency unavailable: {}", e);
            LATENCY_UNAVAILABLE
        }
        None => LATENCY_UNAVAILABLE,
    }
}
