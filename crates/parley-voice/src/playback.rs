//! Playback loop: drains the buffer into the sink adapter.
//!
//! Runs on the dedicated playback thread and is the only code that blocks on
//! device I/O. Each iteration:
//!
//! 1. observe the buffer epoch; if it moved, interrupt the device so nothing
//!    of the superseded turn keeps playing;
//! 2. drain one chunk and write it, unless its epoch went stale meanwhile;
//! 3. wait while the device already holds enough audio, re-checking the
//!    epoch so a barge-in cuts the wait short;
//! 4. with nothing to drain, report `Drained` once and sleep `idle_poll`.
//!
//! Shutdown drains what is left, bounded by the grace period, then closes
//! the sink.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parley_core::{Epoch, PlaybackNotice};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::buffer::PlaybackBuffer;
use crate::sink::{SinkAdapter, WriteOutcome};

/// Tuning for [`PlaybackLoop`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Largest chunk handed to the device per write.
    pub chunk_bytes: usize,
    /// Sleep while the buffer is empty.
    pub idle_poll: Duration,
    /// How long draining may continue once shutdown is requested.
    pub shutdown_grace: Duration,
    /// Chunks the device may hold before the loop waits.
    pub device_queue_chunks: usize,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Bytes accepted by the device (including after recovery).
    pub bytes_written: u64,
    /// Bytes drained but thrown away: stale epoch, disabled sink, rejected chunk.
    pub bytes_discarded: u64,
    /// Barge-ins observed.
    pub interrupts: u64,
    /// Bytes still buffered when the grace period ran out.
    pub bytes_abandoned: u64,
}

/// The consumer side of the playback buffer.
pub struct PlaybackLoop {
    buffer: Arc<PlaybackBuffer>,
    adapter: SinkAdapter,
    notices: mpsc::UnboundedSender<PlaybackNotice>,
    shutdown: CancellationToken,
    config: LoopConfig,
}

impl PlaybackLoop {
    pub fn new(
        buffer: Arc<PlaybackBuffer>,
        adapter: SinkAdapter,
        notices: mpsc::UnboundedSender<PlaybackNotice>,
        shutdown: CancellationToken,
        config: LoopConfig,
    ) -> Self {
        Self {
            buffer,
            adapter,
            notices,
            shutdown,
            config,
        }
    }

    /// Run until shutdown; blocks the calling thread.
    pub fn run(mut self) -> LoopReport {
        let mut report = LoopReport::default();
        let mut observed = self.buffer.current_epoch();
        // Epoch of audio handed to the adapter since the buffer last ran empty.
        let mut playing: Option<Epoch> = None;
        let mut deadline: Option<Instant> = None;

        if let Some(reason) = self.adapter.disabled_reason() {
            let _ = self.notices.send(PlaybackNotice::Disabled(reason.to_owned()));
        }

        loop {
            if deadline.is_none() && self.shutdown.is_cancelled() {
                tracing::debug!(
                    buffered = self.buffer.len(),
                    grace_ms = self.config.shutdown_grace.as_millis(),
                    "playback draining before shutdown"
                );
                deadline = Some(Instant::now() + self.config.shutdown_grace);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                report.bytes_abandoned = self.buffer.len() as u64;
                break;
            }

            let current = self.buffer.current_epoch();
            if current != observed {
                self.interrupt(&mut report, current);
                observed = current;
                playing = None;
            }

            let Some(chunk) = self.buffer.drain_chunk(self.config.chunk_bytes) else {
                if let Some(epoch) = playing.take() {
                    let _ = self.notices.send(PlaybackNotice::Drained(epoch));
                }
                if deadline.is_some() {
                    self.wait_for_device(deadline, observed);
                    break;
                }
                thread::sleep(self.config.idle_poll);
                continue;
            };

            if !self.buffer.is_current(chunk.epoch) {
                report.bytes_discarded += chunk.bytes.len() as u64;
                continue;
            }

            let len = chunk.bytes.len() as u64;
            playing = Some(chunk.epoch);
            match self.adapter.write(&chunk.bytes) {
                Ok(WriteOutcome::Discarded) => report.bytes_discarded += len,
                Ok(_) => report.bytes_written += len,
                Err(e) => {
                    report.bytes_discarded += len;
                    let _ = self.notices.send(PlaybackNotice::Disabled(e.to_string()));
                }
            }

            self.wait_for_device(deadline, observed);
        }

        self.adapter.close();
        tracing::info!(
            written = report.bytes_written,
            discarded = report.bytes_discarded,
            abandoned = report.bytes_abandoned,
            interrupts = report.interrupts,
            "playback loop stopped"
        );
        report
    }

    fn interrupt(&mut self, report: &mut LoopReport, epoch: Epoch) {
        tracing::debug!(%epoch, "barge-in observed, stopping device");
        self.adapter.interrupt();
        report.interrupts += 1;
    }

    /// Let the device work through its queue, but give up immediately on a
    /// barge-in (the main loop then interrupts) or when the deadline passes.
    ///
    /// Before shutdown the wait stops at `device_queue_chunks`; during the
    /// shutdown drain it waits for the queue to empty.
    fn wait_for_device(&self, deadline: Option<Instant>, observed: Epoch) {
        let limit = if deadline.is_some() {
            0
        } else {
            self.config.device_queue_chunks
        };
        while self.adapter.queued() > limit {
            if self.buffer.current_epoch() != observed {
                return;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return;
            }
            if deadline.is_none() && self.shutdown.is_cancelled() {
                return;
            }
            thread::sleep(self.config.idle_poll.min(Duration::from_millis(5)));
        }
    }
}
