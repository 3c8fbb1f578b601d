//! # Duplex Amp
//!
//! Low-latency duplex audio amplifier: capture from an input device,
//! amplify, render to the output device, all from the output stream's
//! real-time callback.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                     Control thread (UI / CLI / FFI)                   │
//! │   configure(device) ── start() ── stop() ── query_*() diagnostics     │
//! └──────────────────────────────┬────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │              StreamLifecycleController (audio::controller)            │
//! │   owns Arc<dyn AudioStream> for input + output, opened through a      │
//! │   StreamProvider (audio::cpal_backend in production)                  │
//! └───────────────┬───────────────────────────────────┬───────────────────┘
//!                 │ Weak refs set at start,           │ registered as the
//!                 │ cleared at stop                   │ output DataCallback
//!                 ▼                                   ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                   DuplexSyncEngine (audio::engine)                    │
//! │                                                                       │
//! │   Drain ──► Cushion ──► Discard ──► Steady                            │
//! │   empty     let input   settle at    read input, × gain,              │
//! │   backlog   refill      equilibrium  silence the tail                 │
//! │                                                                       │
//! │   runs on the output stream's real-time thread, never blocks          │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;

pub use error::{AudioError, Error, Result};

/// Application-wide constants
pub mod constants {
    /// Linear gain applied to every passed-through sample
    pub const DEFAULT_GAIN: f32 = 1.5;

    /// Callbacks that must actually drain input before the cushion phase
    pub const DRAIN_CALLBACKS: u32 = 20;

    /// Callbacks spent letting the input refill slightly
    pub const CUSHION_CALLBACKS: u32 = 1;

    /// Callbacks whose input is read and thrown away
    pub const DISCARD_CALLBACKS: u32 = 30;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default buffer capacity per stream (in frames)
    pub const DEFAULT_BUFFER_CAPACITY_FRAMES: u32 = 4096;

    /// Device id meaning "let the host pick its default device"
    pub const UNSPECIFIED_DEVICE_ID: i32 = 0;

    /// Sentinel returned by latency queries that cannot be answered
    pub const LATENCY_UNAVAILABLE: f64 = -1.0;
}
