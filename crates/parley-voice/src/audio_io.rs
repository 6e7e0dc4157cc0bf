//! `PcmSink` / `SinkFactory` trait abstractions for audio output.
//!
//! These traits decouple the [`PlaybackLoop`](crate::playback::PlaybackLoop)
//! from any specific output backend:
//!
//! | Implementor | Where used |
//! |---|---|
//! | [`RodioSink`](crate::output::RodioSink) | Default: speakers via rodio |
//! | [`FileSink`](crate::output::FileSink) | `--output-pcm`: raw PCM16 LE written to a file |
//! | [`NullSink`](crate::output::NullSink) | `--no-playback`: audio discarded |
//!
//! Sinks are created through a [`SinkFactory`] *on the playback thread* and
//! never leave it, so implementations need not be `Send` (rodio's output
//! stream is not, on some platforms). Factories themselves are `Send` so
//! they can be moved onto that thread.

use std::fmt;

use parley_core::PCM_SAMPLE_RATE;

/// Raw PCM layout. Samples are always signed 16-bit little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    /// 16 kHz mono, the only layout the dialogue service speaks.
    pub const SPEECH: Self = Self {
        sample_rate: PCM_SAMPLE_RATE,
        channels: 1,
    };
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pcm16le/{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// How a sink operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Device paused or stopped; a restart may fix it.
    #[error("audio sink not running: {0}")]
    Transient(String),

    /// Device lost or broken; only reopening can fix it.
    #[error("audio device failed: {0}")]
    Fatal(String),
}

/// An opened audio output accepting raw PCM bytes.
#[cfg_attr(test, mockall::automock)]
pub trait PcmSink {
    /// Hand `pcm` to the device. May block while the device catches up.
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError>;

    /// Chunks handed to the device that have not finished playing.
    fn queued(&self) -> usize;

    /// Resume after a stop or pause.
    fn start(&mut self) -> Result<(), SinkError>;

    /// Drop whatever the device has queued and stop producing sound.
    fn stop(&mut self);

    /// Release the device. Idempotent.
    fn close(&mut self);
}

/// Opens sinks with a given format.
#[cfg_attr(test, mockall::automock)]
pub trait SinkFactory: Send {
    /// Open a sink ready to accept writes.
    fn open(&mut self, format: PcmFormat) -> Result<Box<dyn PcmSink>, SinkError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}
