//! Failure-tolerant wrapper around a [`PcmSink`].
//!
//! Recovery ladder for a failed write:
//!
//! 1. `Transient` (device paused/stopped): restart the sink, retry once.
//! 2. `Fatal`, or the retry failed: close, reopen through the factory with
//!    the same [`PcmFormat`], retry once.
//! 3. Reopen failed: the adapter is disabled. Later writes are discarded
//!    without touching any device.

use crate::audio_io::{PcmFormat, PcmSink, SinkError, SinkFactory};

/// What happened to a chunk handed to [`SinkAdapter::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written on the first try.
    Written,
    /// Written after restarting the sink.
    Restarted,
    /// Written after reopening the device.
    Reopened,
    /// Dropped: the device was reopened but rejected the chunk again, or the
    /// adapter is disabled.
    Discarded,
}

/// Owns the current sink and the factory that can replace it.
pub struct SinkAdapter {
    factory: Box<dyn SinkFactory>,
    format: PcmFormat,
    sink: Option<Box<dyn PcmSink>>,
    disabled: Option<String>,
}

impl SinkAdapter {
    /// Open the first sink. If that fails the adapter starts disabled.
    pub fn open(mut factory: Box<dyn SinkFactory>, format: PcmFormat) -> Self {
        let (sink, disabled) = match factory.open(format) {
            Ok(sink) => {
                tracing::info!(output = %factory.describe(), %format, "audio output opened");
                (Some(sink), None)
            }
            Err(e) => {
                tracing::error!(output = %factory.describe(), error = %e, "audio output unavailable");
                (None, Some(e.to_string()))
            }
        };
        Self {
            factory,
            format,
            sink,
            disabled,
        }
    }

    /// Why the adapter stopped using the device, if it did.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled.as_deref()
    }

    pub const fn is_disabled(&self) -> bool {
        self.disabled.is_some()
    }

    /// Write one chunk, walking the recovery ladder on failure.
    ///
    /// Returns `Err(SinkError::Fatal)` exactly once: on the write that
    /// disables the adapter.
    pub fn write(&mut self, pcm: &[u8]) -> Result<WriteOutcome, SinkError> {
        if self.disabled.is_some() {
            return Ok(WriteOutcome::Discarded);
        }
        let Some(sink) = self.sink.as_mut() else {
            return self.reopen(pcm, "no open sink");
        };

        match sink.write(pcm) {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(SinkError::Transient(reason)) => {
                tracing::warn!(%reason, "audio sink stalled, restarting");
                match sink.start().and_then(|()| sink.write(pcm)) {
                    Ok(()) => Ok(WriteOutcome::Restarted),
                    Err(e) => self.reopen(pcm, &e.to_string()),
                }
            }
            Err(SinkError::Fatal(reason)) => self.reopen(pcm, &reason),
        }
    }

    fn reopen(&mut self, pcm: &[u8], cause: &str) -> Result<WriteOutcome, SinkError> {
        tracing::warn!(%cause, "reinitializing audio output");
        if let Some(mut old) = self.sink.take() {
            old.close();
        }

        match self.factory.open(self.format) {
            Ok(mut sink) => {
                let outcome = match sink.write(pcm) {
                    Ok(()) => WriteOutcome::Reopened,
                    Err(e) => {
                        tracing::warn!(error = %e, bytes = pcm.len(), "reopened sink rejected chunk");
                        WriteOutcome::Discarded
                    }
                };
                self.sink = Some(sink);
                Ok(outcome)
            }
            Err(e) => {
                let reason = format!("{cause}; reopen failed: {e}");
                tracing::error!(%reason, "audio output disabled");
                self.disabled = Some(reason.clone());
                Err(SinkError::Fatal(reason))
            }
        }
    }

    /// Chunks still queued on the device.
    pub fn queued(&self) -> usize {
        self.sink.as_ref().map_or(0, |sink| sink.queued())
    }

    /// Barge-in: drop the device queue and re-arm for the next turn.
    pub fn interrupt(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        sink.stop();
        if let Err(e) = sink.start() {
            // The next write walks the recovery ladder.
            tracing::debug!(error = %e, "sink restart after interrupt failed");
        }
    }

    /// Release the device. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
    }
}

impl Drop for SinkAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_io::{MockPcmSink, MockSinkFactory};

    fn healthy_sink() -> MockPcmSink {
        let mut sink = MockPcmSink::new();
        sink.expect_write().returning(|_| Ok(()));
        sink.expect_close().return_const(());
        sink
    }

    fn factory_with(sinks: Vec<MockPcmSink>) -> MockSinkFactory {
        let mut sinks = sinks.into_iter();
        let mut factory = MockSinkFactory::new();
        factory.expect_describe().return_const("mock".to_owned());
        factory.expect_open().returning(move |_| {
            sinks
                .next()
                .map(|sink| Box::new(sink) as Box<dyn PcmSink>)
                .ok_or_else(|| SinkError::Fatal("no device".to_owned()))
        });
        factory
    }

    #[test]
    fn test_plain_write() {
        let mut adapter = SinkAdapter::open(Box::new(factory_with(vec![healthy_sink()])), PcmFormat::SPEECH);
        assert_eq!(adapter.write(b"ab"), Ok(WriteOutcome::Written));
    }

    #[test]
    fn test_transient_failure_restarts_and_retries_once() {
        let mut calls = 0;
        let mut sink = MockPcmSink::new();
        sink.expect_write().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(SinkError::Transient("paused".to_owned()))
            } else {
                Ok(())
            }
        });
        sink.expect_start().times(1).returning(|| Ok(()));
        sink.expect_close().return_const(());

        let mut adapter = SinkAdapter::open(Box::new(factory_with(vec![sink])), PcmFormat::SPEECH);
        assert_eq!(adapter.write(b"ab"), Ok(WriteOutcome::Restarted));
    }

    #[test]
    fn test_double_failure_reinitializes() {
        let mut first = MockPcmSink::new();
        first
            .expect_write()
            .times(2)
            .returning(|_| Err(SinkError::Transient("stopped".to_owned())));
        first.expect_start().times(1).returning(|| Ok(()));
        first.expect_close().times(1).return_const(());

        let mut adapter = SinkAdapter::open(
            Box::new(factory_with(vec![first, healthy_sink()])),
            PcmFormat::SPEECH,
        );
        assert_eq!(adapter.write(b"ab"), Ok(WriteOutcome::Reopened));
        assert_eq!(adapter.write(b"cd"), Ok(WriteOutcome::Written));
    }

    #[test]
    fn test_fatal_then_failed_reopen_disables() {
        let mut first = MockPcmSink::new();
        first
            .expect_write()
            .times(1)
            .returning(|_| Err(SinkError::Fatal("unplugged".to_owned())));
        first.expect_close().times(1).return_const(());

        let mut adapter = SinkAdapter::open(Box::new(factory_with(vec![first])), PcmFormat::SPEECH);
        assert!(matches!(adapter.write(b"ab"), Err(SinkError::Fatal(_))));
        assert!(adapter.is_disabled());
        assert!(adapter.disabled_reason().unwrap().contains("unplugged"));

        // Later writes never touch a device.
        assert_eq!(adapter.write(b"cd"), Ok(WriteOutcome::Discarded));
    }

    #[test]
    fn test_initial_open_failure_starts_disabled() {
        let adapter = SinkAdapter::open(Box::new(factory_with(Vec::new())), PcmFormat::SPEECH);
        assert!(adapter.is_disabled());
        assert_eq!(adapter.queued(), 0);
    }

    #[test]
    fn test_interrupt_stops_and_rearms() {
        let mut sink = healthy_sink();
        sink.expect_stop().times(1).return_const(());
        sink.expect_start().times(1).returning(|| Ok(()));

        let mut adapter = SinkAdapter::open(Box::new(factory_with(vec![sink])), PcmFormat::SPEECH);
        adapter.interrupt();
        adapter.close();
        adapter.close();
    }
}
