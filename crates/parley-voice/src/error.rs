//! Audio subsystem error types.

use std::path::PathBuf;

/// Errors raised while setting up or running audio I/O.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// Failed to open audio input stream.
    #[error("Failed to open audio input stream: {0}")]
    InputStreamError(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    ResampleError(String),

    /// WAV input is missing, unreadable or not 16 kHz mono PCM16.
    #[error("Unusable WAV input {path}: {reason}")]
    WavInput { path: PathBuf, reason: String },

    /// A dedicated audio thread could not be started or died early.
    #[error("Audio thread failed: {0}")]
    AudioThread(String),

    /// IO error (output files, WAV input).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
