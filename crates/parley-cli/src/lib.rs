#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings (used by the integration tests)
#[cfg(test)]
use base64 as _;
#[cfg(test)]
use hound as _;
#[cfg(test)]
use serde_json as _;

// Used by the binary only
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod channel;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod parser;
pub mod runtime;

// Re-export primary types for convenient access
pub use commands::Command;
pub use config::{AudioInput, AudioOutput, ClientConfig};
pub use console::{Console, Renderer};
pub use error::ClientError;
pub use parser::Cli;
pub use runtime::{SessionOptions, SessionReport, run_session};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Run the interactive client for parsed command-line arguments.
pub async fn run(cli: &Cli) -> Result<SessionReport, ClientError> {
    let config = ClientConfig::from_cli(cli)?;

    if config.input == AudioInput::Microphone {
        match parley_voice::default_input_device() {
            Ok(device) => tracing::info!(
                device = %device.name,
                sample_rate = device.sample_rate,
                channels = device.channels,
                "using default microphone"
            ),
            Err(e) => tracing::warn!(error = %e, "no usable microphone"),
        }
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt signal received");
            ctrl_c.cancel();
        }
    });

    let (command_tx, command_rx) = mpsc::channel(16);
    commands::spawn_stdin_listener(command_tx)?;

    let options = SessionOptions {
        output: config.output.sink_factory(),
        settings: config.settings,
        input: config.input,
    };
    let mut console = Console::stdout();
    let report = run_session(options, command_rx, &mut console, shutdown).await?;

    tracing::info!(
        reason = %report.close_reason,
        audio_frames_sent = report.audio_frames_sent,
        played = report.playback.as_ref().map_or(0, |p| p.bytes_written),
        "session finished"
    );
    Ok(report)
}
