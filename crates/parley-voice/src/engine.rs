//! Playback engine: the single owner of the playback buffer and thread.
//!
//! Output devices (rodio's `OutputStream`) are `!Send` on some platforms.
//! Rather than sharing them, the engine confines the sink to one dedicated OS
//! thread running the [`PlaybackLoop`]; the sink is created on that thread
//! through a [`SinkFactory`] and never leaves it.
//!
//! The engine itself is `Send + Sync` and implements [`PlaybackPort`], so the
//! session dispatcher can hold it behind an `Arc` and only ever sees
//! `append` / `reset` / `buffered_bytes`.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parley_core::{AppendOutcome, Epoch, PlaybackNotice, PlaybackPort, PlaybackSettings};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio_io::{PcmFormat, SinkFactory};
use crate::buffer::PlaybackBuffer;
use crate::error::VoiceError;
use crate::playback::{LoopConfig, LoopReport, PlaybackLoop};
use crate::sink::SinkAdapter;

/// `Send + Sync` handle to the playback subsystem.
pub struct PlaybackEngine {
    buffer: Arc<PlaybackBuffer>,
    append_timeout: Duration,
    shutdown: CancellationToken,
    thread: Mutex<Option<thread::JoinHandle<LoopReport>>>,
}

impl PlaybackEngine {
    /// Spawn the playback thread and return the engine plus the receiver of
    /// its [`PlaybackNotice`]s.
    ///
    /// Cancelling `shutdown` starts the graceful drain; so does
    /// [`shutdown`](Self::shutdown).
    pub fn spawn(
        settings: &PlaybackSettings,
        factory: Box<dyn SinkFactory>,
        shutdown: CancellationToken,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PlaybackNotice>), VoiceError> {
        let buffer = Arc::new(PlaybackBuffer::new(settings.buffer_capacity_bytes));
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let config = LoopConfig {
            chunk_bytes: settings.chunk_bytes,
            idle_poll: settings.idle_poll(),
            shutdown_grace: settings.shutdown_grace(),
            device_queue_chunks: settings.device_queue_chunks,
        };

        let loop_buffer = Arc::clone(&buffer);
        let loop_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name("parley-playback".into())
            .spawn(move || {
                let adapter = SinkAdapter::open(factory, PcmFormat::SPEECH);
                PlaybackLoop::new(loop_buffer, adapter, notice_tx, loop_shutdown, config).run()
            })
            .map_err(|e| VoiceError::AudioThread(format!("failed to spawn playback thread: {e}")))?;

        tracing::debug!(
            capacity = settings.buffer_capacity_bytes,
            chunk = settings.chunk_bytes,
            "playback engine started"
        );

        let engine = Self {
            buffer,
            append_timeout: settings.append_timeout(),
            shutdown,
            thread: Mutex::new(Some(thread)),
        };
        Ok((engine, notice_rx))
    }

    pub const fn buffer(&self) -> &Arc<PlaybackBuffer> {
        &self.buffer
    }

    /// Request a graceful stop and wait for the playback thread.
    ///
    /// Blocks for at most the configured grace period plus one device write.
    /// Returns `None` if the thread was already joined or panicked.
    pub fn shutdown(&self) -> Option<LoopReport> {
        self.shutdown.cancel();
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                tracing::error!("playback thread panicked");
                None
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[async_trait]
impl PlaybackPort for PlaybackEngine {
    async fn append(&self, pcm: Bytes, epoch: Epoch) -> AppendOutcome {
        self.buffer
            .append_within(&pcm, epoch, self.append_timeout)
            .await
    }

    fn reset(&self, epoch: Epoch) -> bool {
        self.buffer.reset(epoch)
    }

    fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }
}
