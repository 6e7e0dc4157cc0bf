//! Session state: phase, utterance epoch, synthesis phase and transcript.
//!
//! [`Session`] is plain data with checked transitions. It is owned by the
//! [`FrameDispatcher`](crate::dispatch::FrameDispatcher), which is the only
//! writer; everything else observes it through [`SessionEvent`](crate::events::SessionEvent)s.

use std::fmt;

use serde::Serialize;

/// Identifier of one user-utterance / machine-response turn.
///
/// Epochs only move forward. Audio tagged with an epoch older than the
/// playback buffer's current one is never played.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Epoch(u64);

impl Epoch {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection-level phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Connected, handshake sent, waiting for the server `hello`.
    AwaitingHello,
    /// Handshake done; audio flows both ways.
    Active,
    /// Terminal.
    Closed,
}

/// Lifecycle of speech synthesis for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SynthesisPhase {
    /// No audio received for the turn yet.
    Idle,
    /// More chunks expected.
    Synthesizing,
    /// Synthesis finished; buffered audio still playing.
    Draining,
    /// Synthesis finished and everything buffered has been played.
    Done,
}

impl fmt::Display for SynthesisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Synthesizing => "synthesizing",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Accumulated assistant text for the current turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One session per connection.
#[derive(Debug, Clone)]
pub struct Session {
    phase: SessionPhase,
    epoch: Epoch,
    /// Epoch of the turn allowed to produce audio. Lags `epoch` after an abort.
    synthesis_epoch: Epoch,
    synthesis: SynthesisPhase,
    transcript: Transcript,
    session_id: Option<String>,
    playback_enabled: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub const fn new() -> Self {
        Self {
            phase: SessionPhase::AwaitingHello,
            epoch: Epoch::ZERO,
            synthesis_epoch: Epoch::ZERO,
            synthesis: SynthesisPhase::Idle,
            transcript: Transcript { text: String::new() },
            session_id: None,
            playback_enabled: true,
        }
    }

    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub const fn is_active(&self) -> bool {
        matches!(self.phase, SessionPhase::Active)
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self.phase, SessionPhase::Closed)
    }

    /// Current utterance epoch.
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Epoch that incoming `tts` audio is tagged with.
    pub const fn synthesis_epoch(&self) -> Epoch {
        self.synthesis_epoch
    }

    pub const fn synthesis_phase(&self) -> SynthesisPhase {
        self.synthesis
    }

    /// Whether the current epoch has an open turn (not aborted).
    pub fn turn_open(&self) -> bool {
        self.synthesis_epoch == self.epoch
    }

    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub const fn playback_enabled(&self) -> bool {
        self.playback_enabled
    }

    /// `AwaitingHello → Active`. Returns `false` from any other phase.
    pub fn activate(&mut self, session_id: Option<String>) -> bool {
        if self.phase != SessionPhase::AwaitingHello {
            return false;
        }
        self.phase = SessionPhase::Active;
        self.session_id = session_id;
        true
    }

    /// Open a new turn: advance the epoch and let it produce audio.
    pub fn begin_turn(&mut self) -> Epoch {
        self.epoch = self.epoch.next();
        self.synthesis_epoch = self.epoch;
        self.synthesis = SynthesisPhase::Idle;
        self.transcript.clear();
        self.epoch
    }

    /// Abort the current turn: advance the epoch without opening a new turn.
    ///
    /// `synthesis_epoch` keeps pointing at the aborted turn, so its late
    /// audio is tagged stale.
    pub fn interrupt(&mut self) -> Epoch {
        self.epoch = self.epoch.next();
        self.synthesis = SynthesisPhase::Idle;
        self.transcript.clear();
        self.epoch
    }

    /// Record a `tts` chunk of the open turn.
    ///
    /// `buffer_empty` tells whether anything of the turn is still waiting to
    /// be played; a completed synthesis with nothing pending is `Done`.
    pub fn record_synthesis(&mut self, complete: bool, buffer_empty: bool) -> SynthesisPhase {
        if !self.turn_open() {
            return self.synthesis;
        }
        self.synthesis = match (complete, buffer_empty) {
            (false, _) => SynthesisPhase::Synthesizing,
            (true, false) => SynthesisPhase::Draining,
            (true, true) => SynthesisPhase::Done,
        };
        self.synthesis
    }

    /// Playback drained everything of `epoch`. Returns `true` on `Draining → Done`.
    pub fn playback_drained(&mut self, epoch: Epoch) -> bool {
        if epoch != self.synthesis_epoch
            || !self.turn_open()
            || self.synthesis != SynthesisPhase::Draining
        {
            return false;
        }
        self.synthesis = SynthesisPhase::Done;
        true
    }

    /// Append an assistant text delta; returns the accumulated text.
    pub fn push_chat(&mut self, delta: &str) -> &str {
        self.transcript.push(delta);
        self.transcript.as_str()
    }

    /// The user started speaking again; the previous answer text is stale.
    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }

    /// Returns `true` the first time playback is disabled.
    pub fn disable_playback(&mut self) -> bool {
        std::mem::replace(&mut self.playback_enabled, false)
    }

    /// Enter the terminal phase. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.phase == SessionPhase::Closed {
            return false;
        }
        self.phase = SessionPhase::Closed;
        true
    }
}
