//! Duplex Amp
//!
//! Captures from an input device, amplifies and plays back on the default
//! output device until Ctrl+C.
//!
//! Usage: `duplex-amp [input-device-id] [config.toml]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duplex_amp::{
    audio::{list_devices, stream::Direction, CpalStreamProvider, StreamLifecycleController},
    config::AppConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Duplex Amp");

    let mut args = std::env::args().skip(1);
    let device_arg = args.next();
    let config = match args.next().map(PathBuf::from) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load_or_default()?,
    };

    println!("\n=== Audio Devices ===");
    for device in list_devices() {
        let kind = match device.direction {
            Direction::Input => "Input",
            Direction::Output => "Output",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  [{}] {} ({}){}", device.id, device.name, kind, default_marker);
        println!("      Sample rates: {:?}", device.sample_rates);
        println!("      Channels: {:?}", device.channels);
    }
    println!();

    let mut controller =
        StreamLifecycleController::new(CpalStreamProvider::new(config.stream.clone()), &config);

    if let Some(id) = device_arg {
        let id: i32 = id
            .parse()
            .with_context(|| format!("Invalid input device id: {}", id))?;
        controller.configure(id);
    }

    controller
        .start()
        .with_context(|| format!("Failed to start streaming from device {}", controller.input_device_id()))?;

    tracing::info!(
        "Bursts: input {} frames, output {} frames - press Ctrl+C to stop",
        controller.query_input_burst_frames(),
        controller.query_output_burst_frames()
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let stats = controller.stats();
                tracing::info!(
                    "phase {}, frames {}, latency in {:.1}ms / out {:.1}ms, passed {} frames, {} short periods",
                    stats.phase,
                    controller.query_last_frame_count(),
                    controller.query_input_latency_ms(),
                    controller.query_output_latency_ms(),
                    stats.frames_passed,
                    stats.short_periods
                );
            }
        }
    }

    controller.stop();
    tracing::info!("Stopped");
    Ok(())
}
