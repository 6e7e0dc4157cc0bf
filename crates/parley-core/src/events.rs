//! Events emitted by the dispatcher for presentation layers.
//!
//! Emission is best-effort: a dropped receiver never affects the session.

use serde::Serialize;

use crate::session::{Epoch, SynthesisPhase};

/// Something the user should see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Handshake acknowledged.
    Connected { session_id: Option<String> },
    /// Live transcript of the user's speech.
    UserSpeech { text: String, is_final: bool },
    /// Assistant answer accumulated so far for the current turn.
    AssistantText { text: String },
    /// A new turn started (final transcript or typed chat).
    TurnStarted { epoch: Epoch },
    /// The user aborted the answer in progress.
    Interrupted { epoch: Epoch },
    /// Synthesis phase of the open turn changed.
    Synthesis { epoch: Epoch, phase: SynthesisPhase },
    /// Audio was dropped because playback could not keep up.
    AudioDropped { epoch: Epoch, bytes: usize },
    /// The service reported an error.
    ServerError { code: i64, message: String },
    /// Playback is off for the rest of the session.
    PlaybackDisabled { reason: String },
    /// Session ended.
    Closed { reason: String },
}
