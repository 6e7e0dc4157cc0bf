//! Port definitions (trait abstractions) for the playback side.
//!
//! The dispatcher never touches the playback buffer or an audio device
//! directly; it talks to whatever implements [`PlaybackPort`]. The audio
//! engine in `parley-voice` is the production implementation, tests use
//! in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::session::Epoch;

/// Result of handing a chunk of PCM to playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Queued for playback.
    Accepted,
    /// Tagged with a superseded epoch; dropped.
    Stale,
    /// No room within the allowed wait; dropped.
    Full,
    /// Larger than the whole buffer; dropped.
    Oversized,
}

impl AppendOutcome {
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Asynchronous notices from the playback subsystem back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackNotice {
    /// Everything buffered for `epoch` has been written to the device.
    Drained(Epoch),
    /// The audio device could not be recovered; audio is discarded from now on.
    Disabled(String),
}

/// Playback operations available to the session.
#[async_trait]
pub trait PlaybackPort: Send + Sync {
    /// Queue `pcm` tagged with `epoch`. May wait a bounded time for space.
    async fn append(&self, pcm: Bytes, epoch: Epoch) -> AppendOutcome;

    /// Barge-in: drop everything queued and move to `epoch`.
    ///
    /// Returns `false` when `epoch` is not newer than the current one.
    fn reset(&self, epoch: Epoch) -> bool;

    /// Bytes currently waiting to be played.
    fn buffered_bytes(&self) -> usize;
}
