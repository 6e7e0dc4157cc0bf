//! Epoch-tagged, bounded playback buffer.
//!
//! The dispatcher appends synthesized PCM, the playback loop drains it from
//! the front, and barge-in resets it. One mutex guards both the bytes and the
//! epoch they belong to, so every operation sees either the state before a
//! reset or the state after it, never a mix.
//!
//! Appends are all-or-nothing per chunk: a chunk that does not fit is
//! refused as a whole rather than partially queued.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use parley_core::{AppendOutcome, Epoch};
use tokio::sync::Notify;

/// Bytes removed from the front of the buffer, with the epoch they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainedChunk {
    pub epoch: Epoch,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct BufferState {
    bytes: VecDeque<u8>,
    epoch: Epoch,
}

/// Bounded FIFO of raw PCM bytes bound to the current epoch.
#[derive(Debug)]
pub struct PlaybackBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
    /// Signalled whenever space frees up or the epoch moves.
    space: Notify,
}

impl PlaybackBuffer {
    /// Empty buffer at epoch zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_epoch(capacity, Epoch::ZERO)
    }

    pub fn with_epoch(capacity: usize, epoch: Epoch) -> Self {
        Self {
            state: Mutex::new(BufferState {
                bytes: VecDeque::with_capacity(capacity.min(1 << 20)),
                epoch,
            }),
            capacity,
            space: Notify::new(),
        }
    }

    // A panic while holding the lock cannot leave the deque half-written,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `bytes` if `epoch` is current and the whole chunk fits.
    pub fn append(&self, bytes: &[u8], epoch: Epoch) -> AppendOutcome {
        let mut state = self.lock();
        if state.epoch != epoch {
            return AppendOutcome::Stale;
        }
        if bytes.len() > self.capacity {
            return AppendOutcome::Oversized;
        }
        if state.bytes.len() + bytes.len() > self.capacity {
            return AppendOutcome::Full;
        }
        state.bytes.extend(bytes);
        AppendOutcome::Accepted
    }

    /// Like [`append`](Self::append), but waits up to `timeout` for space.
    ///
    /// Returns `Stale` as soon as a reset supersedes `epoch` while waiting.
    pub async fn append_within(&self, bytes: &[u8], epoch: Epoch, timeout: Duration) -> AppendOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            // Register before trying so a drain between the attempt and the
            // wait is not missed.
            notified.as_mut().enable();

            let outcome = self.append(bytes, epoch);
            if outcome != AppendOutcome::Full {
                return outcome;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.append(bytes, epoch);
            }
        }
    }

    /// Clear everything and move to `new_epoch`.
    ///
    /// No-op returning `false` unless `new_epoch` is newer than the current one.
    pub fn reset(&self, new_epoch: Epoch) -> bool {
        let dropped = {
            let mut state = self.lock();
            if new_epoch <= state.epoch {
                return false;
            }
            let dropped = state.bytes.len();
            state.bytes.clear();
            state.epoch = new_epoch;
            dropped
        };
        tracing::debug!(epoch = %new_epoch, dropped, "playback buffer reset");
        self.space.notify_waiters();
        true
    }

    /// Remove up to `max_size` bytes from the front. Never blocks on data.
    pub fn drain_chunk(&self, max_size: usize) -> Option<DrainedChunk> {
        let chunk = {
            let mut state = self.lock();
            if state.bytes.is_empty() || max_size == 0 {
                return None;
            }
            let take = max_size.min(state.bytes.len());
            DrainedChunk {
                epoch: state.epoch,
                bytes: state.bytes.drain(..take).collect(),
            }
        };
        self.space.notify_waiters();
        Some(chunk)
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.lock().epoch == epoch
    }

    pub fn current_epoch(&self) -> Epoch {
        self.lock().epoch
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().bytes.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_append_and_drain_in_order() {
        let buffer = PlaybackBuffer::new(16);
        assert_eq!(buffer.append(b"abc", Epoch::ZERO), AppendOutcome::Accepted);
        assert_eq!(buffer.append(b"def", Epoch::ZERO), AppendOutcome::Accepted);

        let first = buffer.drain_chunk(4).unwrap();
        assert_eq!(first.bytes, b"abcd");
        assert_eq!(first.epoch, Epoch::ZERO);
        assert_eq!(buffer.drain_chunk(4).unwrap().bytes, b"ef");
        assert!(buffer.drain_chunk(4).is_none());
    }

    #[test]
    fn test_stale_epoch_rejected() {
        let buffer = PlaybackBuffer::new(16);
        assert!(buffer.reset(Epoch::new(3)));
        assert_eq!(buffer.append(b"old", Epoch::new(2)), AppendOutcome::Stale);
        assert_eq!(buffer.append(b"new", Epoch::new(4)), AppendOutcome::Stale);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_full_is_all_or_nothing() {
        let buffer = PlaybackBuffer::new(4);
        assert_eq!(buffer.append(b"abc", Epoch::ZERO), AppendOutcome::Accepted);
        assert_eq!(buffer.append(b"de", Epoch::ZERO), AppendOutcome::Full);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.append(b"abcde", Epoch::ZERO), AppendOutcome::Oversized);
    }

    #[test]
    fn test_reset_requires_newer_epoch() {
        let buffer = PlaybackBuffer::with_epoch(8, Epoch::new(2));
        buffer.append(b"xy", Epoch::new(2));
        assert!(!buffer.reset(Epoch::new(2)));
        assert!(!buffer.reset(Epoch::new(1)));
        assert_eq!(buffer.len(), 2);
        assert!(buffer.reset(Epoch::new(5)));
        assert!(buffer.is_empty());
        assert!(buffer.is_current(Epoch::new(5)));
    }

    #[test]
    fn test_drain_zero_is_none() {
        let buffer = PlaybackBuffer::new(8);
        buffer.append(b"x", Epoch::ZERO);
        assert!(buffer.drain_chunk(0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_within_waits_for_drain() {
        let buffer = Arc::new(PlaybackBuffer::new(4));
        buffer.append(b"abcd", Epoch::ZERO);

        let drainer = Arc::clone(&buffer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drainer.drain_chunk(2);
        });

        let outcome = buffer
            .append_within(b"ef", Epoch::ZERO, Duration::from_millis(200))
            .await;
        assert_eq!(outcome, AppendOutcome::Accepted);
        assert_eq!(buffer.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_within_is_woken_by_drain() {
        let buffer = PlaybackBuffer::new(4);
        buffer.append(b"abcd", Epoch::ZERO);

        let mut waiting = tokio_test::task::spawn(buffer.append_within(
            b"ef",
            Epoch::ZERO,
            Duration::from_secs(1),
        ));
        tokio_test::assert_pending!(waiting.poll());
        assert!(!waiting.is_woken());

        buffer.drain_chunk(2);
        assert!(waiting.is_woken());
        tokio_test::assert_ready_eq!(waiting.poll(), AppendOutcome::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_within_times_out() {
        let buffer = PlaybackBuffer::new(4);
        buffer.append(b"abcd", Epoch::ZERO);
        let outcome = buffer
            .append_within(b"e", Epoch::ZERO, Duration::from_millis(200))
            .await;
        assert_eq!(outcome, AppendOutcome::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_within_sees_reset_as_stale() {
        let buffer = Arc::new(PlaybackBuffer::new(4));
        buffer.append(b"abcd", Epoch::ZERO);

        let resetter = Arc::clone(&buffer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resetter.reset(Epoch::new(1));
        });

        let outcome = buffer
            .append_within(b"e", Epoch::ZERO, Duration::from_secs(5))
            .await;
        assert_eq!(outcome, AppendOutcome::Stale);
    }
}
