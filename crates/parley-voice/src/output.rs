//! Concrete audio outputs: rodio speakers, raw PCM file, null.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};

use crate::audio_io::{PcmFormat, PcmSink, SinkError, SinkFactory};
use crate::pcm::Pcm16Decoder;

// ── Speakers ───────────────────────────────────────────────────────

/// Opens [`RodioSink`]s on the default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioSinkFactory;

impl SinkFactory for RodioSinkFactory {
    fn open(&mut self, format: PcmFormat) -> Result<Box<dyn PcmSink>, SinkError> {
        Ok(Box::new(RodioSink::open(format)?))
    }

    fn describe(&self) -> String {
        "default output device".to_owned()
    }
}

/// Speaker output via rodio.
///
/// Each write is queued as one `SamplesBuffer`; `queued()` reports how many
/// are still waiting so the playback loop can keep the device queue short
/// and barge-in stays responsive. `stop()` throws the whole rodio sink away,
/// which is the only way rodio drops queued sources immediately.
pub struct RodioSink {
    /// rodio output stream (must be kept alive).
    _stream: OutputStream,

    /// Handle used to create sinks.
    stream_handle: OutputStreamHandle,

    /// Current playback sink; `None` after `stop()` until `start()`.
    sink: Option<Sink>,

    format: PcmFormat,
    decoder: Pcm16Decoder,
}

impl RodioSink {
    pub fn open(format: PcmFormat) -> Result<Self, SinkError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| SinkError::Fatal(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle).map_err(|e| SinkError::Fatal(e.to_string()))?;

        tracing::debug!(%format, "rodio sink created");
        Ok(Self {
            _stream: stream,
            stream_handle,
            sink: Some(sink),
            format,
            decoder: Pcm16Decoder::default(),
        })
    }
}

impl PcmSink for RodioSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        let Some(sink) = &self.sink else {
            return Err(SinkError::Transient("sink stopped".to_owned()));
        };
        if sink.is_paused() {
            return Err(SinkError::Transient("sink paused".to_owned()));
        }

        let samples = self.decoder.decode(pcm);
        if !samples.is_empty() {
            sink.append(SamplesBuffer::new(
                self.format.channels,
                self.format.sample_rate,
                samples,
            ));
        }
        Ok(())
    }

    fn queued(&self) -> usize {
        self.sink.as_ref().map_or(0, Sink::len)
    }

    fn start(&mut self) -> Result<(), SinkError> {
        match &self.sink {
            Some(sink) => sink.play(),
            None => {
                let sink = Sink::try_new(&self.stream_handle)
                    .map_err(|e| SinkError::Fatal(e.to_string()))?;
                self.sink = Some(sink);
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.decoder.clear();
    }

    fn close(&mut self) {
        self.stop();
    }
}

// ── Raw PCM file ───────────────────────────────────────────────────

/// Opens [`FileSink`]s writing to one path.
///
/// The first open truncates the file; reopens after a failure append, so a
/// recovered device does not erase what was already written.
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    path: PathBuf,
    opened: bool,
}

impl FileSinkFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            opened: false,
        }
    }
}

impl SinkFactory for FileSinkFactory {
    fn open(&mut self, _format: PcmFormat) -> Result<Box<dyn PcmSink>, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.opened)
            .truncate(!self.opened)
            .open(&self.path)
            .map_err(|e| SinkError::Fatal(format!("{}: {e}", self.path.display())))?;
        self.opened = true;
        Ok(Box::new(FileSink {
            writer: Some(BufWriter::new(file)),
        }))
    }

    fn describe(&self) -> String {
        format!("raw PCM file {}", self.path.display())
    }
}

/// Writes raw PCM16 LE bytes to a file.
pub struct FileSink {
    writer: Option<BufWriter<File>>,
}

impl PcmSink for FileSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Fatal("file closed".to_owned()))?;
        writer
            .write_all(pcm)
            .map_err(|e| SinkError::Fatal(e.to_string()))
    }

    fn queued(&self) -> usize {
        0
    }

    fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::warn!(error = %e, "failed to flush PCM output file");
            }
        }
    }
}

// ── Null ───────────────────────────────────────────────────────────

/// Opens [`NullSink`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSinkFactory;

impl SinkFactory for NullSinkFactory {
    fn open(&mut self, _format: PcmFormat) -> Result<Box<dyn PcmSink>, SinkError> {
        Ok(Box::new(NullSink::default()))
    }

    fn describe(&self) -> String {
        "null output".to_owned()
    }
}

/// Discards audio, counting the bytes it was given.
#[derive(Debug, Default)]
pub struct NullSink {
    discarded: u64,
}

impl PcmSink for NullSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        self.discarded += pcm.len() as u64;
        Ok(())
    }

    fn queued(&self) -> usize {
        0
    }

    fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn close(&mut self) {
        tracing::debug!(bytes = self.discarded, "null output closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_truncates_then_appends_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pcm");
        std::fs::write(&path, b"stale").unwrap();

        let mut factory = FileSinkFactory::new(&path);
        let mut first = factory.open(PcmFormat::SPEECH).unwrap();
        first.write(b"abcd").unwrap();
        first.close();

        let mut second = factory.open(PcmFormat::SPEECH).unwrap();
        second.write(b"ef").unwrap();
        second.close();

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[test]
    fn test_file_sink_write_after_close_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = FileSinkFactory::new(dir.path().join("out.pcm"));
        let mut sink = factory.open(PcmFormat::SPEECH).unwrap();
        sink.close();
        assert!(matches!(sink.write(b"x"), Err(SinkError::Fatal(_))));
    }

    #[test]
    fn test_unwritable_path_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = FileSinkFactory::new(dir.path().join("missing").join("out.pcm"));
        assert!(matches!(
            factory.open(PcmFormat::SPEECH),
            Err(SinkError::Fatal(_))
        ));
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        let mut sink = NullSinkFactory.open(PcmFormat::SPEECH).unwrap();
        sink.write(&[0; 64]).unwrap();
        assert_eq!(sink.queued(), 0);
        sink.close();
    }
}
