//! CLI-specific error types and exit code mapping.

use parley_core::SettingsError;
use parley_voice::VoiceError;
use thiserror::Error;

/// Errors that end the client.
///
/// Everything recoverable (malformed frames, dropped audio, a failed output
/// device) is handled inside the session and never reaches this type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid settings, config file or flags.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The dialogue service could not be reached.
    #[error("Cannot connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The connection failed after it was established.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Audio subsystem could not be started.
    #[error("Audio error: {0}")]
    Audio(String),

    /// IO error (stdin listener, output files).
    #[error("IO error: {0}")]
    Io(String),
}

impl ClientError {
    /// Map error to a process exit code (sysexits.h conventions).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Connect { .. } | Self::Channel(_) => 69, // EX_UNAVAILABLE
            Self::Audio(_) | Self::Io(_) => 74,            // EX_IOERR
            Self::Config(_) => 78,                         // EX_CONFIG
        }
    }
}

impl From<SettingsError> for ClientError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<VoiceError> for ClientError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::WavInput { .. } => Self::Config(err.to_string()),
            other => Self::Audio(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
