//! Client settings and validation.
//!
//! Pure data with defaults; the CLI layers a YAML file, environment variables
//! and flags on top and then calls [`validate_settings`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{AsrParams, Hello, TtsParams};

/// Default dialogue endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:28080/crow/v1";

/// The only sample rate the client captures and plays.
pub const PCM_SAMPLE_RATE: u32 = 16_000;

/// Bytes per second of PCM16 mono at [`PCM_SAMPLE_RATE`].
pub const PCM_BYTES_PER_SECOND: usize = PCM_SAMPLE_RATE as usize * 2;

/// Upper bound on the playback shutdown grace period.
pub const MAX_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything the client needs to run one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// `ws://` or `wss://` endpoint of the dialogue service.
    pub url: String,

    /// Stream microphone audio and request recognition.
    pub enable_asr: bool,

    /// Request synthesized speech.
    pub enable_tts: bool,

    pub asr: AsrParams,
    pub tts: TtsParams,
    pub playback: PlaybackSettings,
    pub capture: CaptureSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_owned(),
            enable_asr: true,
            enable_tts: true,
            asr: AsrParams::default(),
            tts: TtsParams::default(),
            playback: PlaybackSettings::default(),
            capture: CaptureSettings::default(),
        }
    }
}

impl ClientSettings {
    /// The handshake frame payload for these settings.
    pub fn hello(&self) -> Hello {
        Hello {
            enable_asr: self.enable_asr,
            enable_tts: self.enable_tts,
            asr_params: self.asr.clone(),
            tts_params: self.tts.clone(),
        }
    }
}

/// Playback buffer and loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Playback buffer capacity in bytes (backpressure bound).
    pub buffer_capacity_bytes: usize,

    /// Largest chunk the playback loop hands to the device at once.
    pub chunk_bytes: usize,

    /// How long the dispatcher waits for buffer space before dropping a chunk.
    pub append_timeout_ms: u64,

    /// Sleep between polls while the buffer is empty.
    pub idle_poll_ms: u64,

    /// How long playback may keep draining after shutdown is requested.
    pub shutdown_grace_ms: u64,

    /// Chunks the device may hold before the loop waits.
    pub device_queue_chunks: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            buffer_capacity_bytes: PCM_BYTES_PER_SECOND * 30,
            chunk_bytes: 3_200,
            append_timeout_ms: 200,
            idle_poll_ms: 10,
            shutdown_grace_ms: 1_000,
            device_queue_chunks: 2,
        }
    }
}

impl PlaybackSettings {
    /// Capacity covering `seconds` of 16 kHz mono PCM16.
    pub fn set_buffer_seconds(&mut self, seconds: u32) {
        self.buffer_capacity_bytes = PCM_BYTES_PER_SECOND * seconds as usize;
    }

    pub const fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.append_timeout_ms)
    }

    pub const fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Microphone / file capture tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Samples per outbound binary frame.
    pub frame_samples: usize,

    /// Outbound frames buffered before capture applies backpressure.
    pub queue_frames: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_samples: 1_024,
            queue_frames: 64,
        }
    }
}

impl CaptureSettings {
    /// Bytes per outbound PCM16 frame.
    pub const fn frame_bytes(&self) -> usize {
        self.frame_samples * 2
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported sample rate {0} Hz (only 16000 is supported)")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported channel count {0} (only mono is supported)")]
    UnsupportedChannels(u16),

    #[error("Unsupported TTS format '{0}' (only 'pcm' can be played)")]
    UnsupportedTtsFormat(String),

    #[error("Playback buffer capacity must be at least one chunk ({chunk} bytes), got {capacity}")]
    BufferTooSmall { capacity: usize, chunk: usize },

    #[error("Playback chunk size must be greater than zero")]
    ZeroChunk,

    #[error("Capture frame size must be greater than zero")]
    ZeroCaptureFrame,

    #[error("Shutdown grace period must be at most 10000 ms, got {0} ms")]
    GraceTooLong(u64),
}

/// Validate settings before a session starts.
pub fn validate_settings(settings: &ClientSettings) -> Result<(), SettingsError> {
    let url = url::Url::parse(&settings.url).map_err(|e| SettingsError::InvalidUrl {
        url: settings.url.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(SettingsError::InvalidUrl {
            url: settings.url.clone(),
            reason: format!("scheme must be ws or wss, not {}", url.scheme()),
        });
    }

    for rate in [settings.asr.sample_rate, settings.tts.sample_rate] {
        if rate != PCM_SAMPLE_RATE {
            return Err(SettingsError::UnsupportedSampleRate(rate));
        }
    }

    if settings.asr.channels != 1 {
        return Err(SettingsError::UnsupportedChannels(settings.asr.channels));
    }

    if !settings.tts.format.eq_ignore_ascii_case("pcm") {
        return Err(SettingsError::UnsupportedTtsFormat(
            settings.tts.format.clone(),
        ));
    }

    let playback = &settings.playback;
    if playback.chunk_bytes == 0 {
        return Err(SettingsError::ZeroChunk);
    }
    if playback.buffer_capacity_bytes < playback.chunk_bytes {
        return Err(SettingsError::BufferTooSmall {
            capacity: playback.buffer_capacity_bytes,
            chunk: playback.chunk_bytes,
        });
    }
    if playback.shutdown_grace() > MAX_SHUTDOWN_GRACE {
        return Err(SettingsError::GraceTooLong(playback.shutdown_grace_ms));
    }

    if settings.capture.frame_samples == 0 {
        return Err(SettingsError::ZeroCaptureFrame);
    }

    Ok(())
}
