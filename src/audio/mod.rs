//! Audio subsystem module

pub mod buffer;
pub mod controller;
pub mod cpal_backend;
pub mod device;
pub mod engine;
pub mod stream;
pub mod warmup;

#[cfg(test)]
pub(crate) mod mock;

pub use controller::StreamLifecycleController;
pub use cpal_backend::CpalStreamProvider;
pub use device::{find_device, list_devices, AudioDeviceInfo};
pub use engine::{DuplexSyncEngine, EngineStats, EngineStatsSnapshot};
pub use stream::{AudioStream, CallbackResult, DataCallback, StreamProvider, StreamRequest};
pub use warmup::{WarmupPhase, WarmupSchedule};
