//! Frame dispatcher: the single writer of session state.
//!
//! Inbound frames and local commands (abort, typed chat, playback notices,
//! close) are fed through one [`FrameDispatcher`] in arrival order. Each call
//! performs exactly one state transition and reports it as a [`Transition`],
//! or explains with [`Ignored`] why nothing happened. Neither outcome is an
//! error for the session: malformed and out-of-phase frames are logged and
//! skipped, and the session keeps going.
//!
//! ```text
//!   channel ──frame──▶ FrameDispatcher ──append/reset──▶ PlaybackPort
//!                         │
//!                         └──SessionEvent──▶ console
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::SessionEvent;
use crate::ports::{AppendOutcome, PlaybackNotice, PlaybackPort};
use crate::protocol::{AsrResult, ServerError, ServerFrame, TtsChunk};
use crate::session::{Epoch, Session, SessionPhase, SynthesisPhase};

/// The state change a dispatch call performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `AwaitingHello → Active`.
    Activated { session_id: Option<String> },
    /// Partial transcript shown; playback untouched.
    PartialTranscript,
    /// New turn opened at `epoch`; `reset` tells whether playback moved to it.
    TurnStarted { epoch: Epoch, reset: bool },
    /// Assistant text delta appended.
    ChatAppended,
    /// Audio handed to playback (possibly zero bytes).
    AudioQueued {
        epoch: Epoch,
        bytes: usize,
        phase: SynthesisPhase,
    },
    /// Audio refused by playback.
    AudioDropped {
        epoch: Epoch,
        bytes: usize,
        outcome: AppendOutcome,
        phase: SynthesisPhase,
    },
    /// Server error reported; phase unchanged.
    ServerError { code: i64 },
    /// Turn aborted locally; epoch advanced without opening a new turn.
    Interrupted { epoch: Epoch },
    /// `Draining → Done` for `epoch`.
    SynthesisDone { epoch: Epoch },
    /// Playback disabled for the rest of the session.
    PlaybackDisabled,
    /// Session entered `Closed`.
    Closed,
}

/// Why a dispatch call changed nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Ignored {
    #[error("`{kind}` frame received before the handshake completed")]
    BeforeHello { kind: String },

    #[error("duplicate hello while already active")]
    DuplicateHello,

    #[error("session is closed")]
    Closed,

    #[error("unknown frame type `{kind}`")]
    Unknown { kind: String },

    #[error("malformed frame: {reason}")]
    Malformed { reason: String },

    #[error("playback notice does not match the current turn")]
    StaleNotice,

    #[error("playback already disabled")]
    AlreadyDisabled,

    #[error("text of an aborted answer")]
    AbortedTurn,
}

pub type DispatchResult = Result<Transition, Ignored>;

/// Routes decoded frames to session transitions and playback operations.
pub struct FrameDispatcher<P: PlaybackPort + ?Sized> {
    session: Session,
    playback: Arc<P>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<P: PlaybackPort + ?Sized> FrameDispatcher<P> {
    /// Create a dispatcher for a fresh session and the receiver of its events.
    pub fn new(playback: Arc<P>) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            session: Session::new(),
            playback,
            events,
        };
        (dispatcher, rx)
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Decode and dispatch one JSON text frame.
    pub async fn dispatch_text(&mut self, text: &str) -> DispatchResult {
        match ServerFrame::decode(text) {
            Ok(frame) => self.dispatch(frame).await,
            Err(e) => {
                let reason = self.malformed(&e);
                tracing::warn!(%reason, "frame dropped");
                Err(reason)
            }
        }
    }

    /// Dispatch one decoded frame.
    pub async fn dispatch(&mut self, frame: ServerFrame) -> DispatchResult {
        let outcome = self.route(frame).await;
        match &outcome {
            Ok(transition) => tracing::debug!(?transition, "frame dispatched"),
            Err(reason @ Ignored::Malformed { .. }) => tracing::warn!(%reason, "frame dropped"),
            Err(reason) => tracing::debug!(%reason, "frame ignored"),
        }
        outcome
    }

    async fn route(&mut self, frame: ServerFrame) -> DispatchResult {
        match (self.session.phase(), frame) {
            (SessionPhase::Closed, _) => Err(Ignored::Closed),
            (_, ServerFrame::Unknown { kind }) => Err(Ignored::Unknown { kind }),
            (SessionPhase::AwaitingHello, ServerFrame::Hello(ack)) => {
                self.session.activate(ack.session_id.clone());
                tracing::info!(session_id = ?ack.session_id, "handshake complete");
                self.emit(SessionEvent::Connected {
                    session_id: ack.session_id.clone(),
                });
                Ok(Transition::Activated {
                    session_id: ack.session_id,
                })
            }
            (SessionPhase::Active, ServerFrame::Hello(_)) => Err(Ignored::DuplicateHello),
            (_, ServerFrame::Error(err)) => Ok(self.server_error(err)),
            (SessionPhase::AwaitingHello, frame) => Err(Ignored::BeforeHello {
                kind: frame.kind().to_owned(),
            }),
            (SessionPhase::Active, ServerFrame::Asr(asr)) => Ok(self.asr(asr)),
            (SessionPhase::Active, ServerFrame::Chat(_)) if !self.session.turn_open() => {
                Err(Ignored::AbortedTurn)
            }
            (SessionPhase::Active, ServerFrame::Chat(delta)) => {
                let text = self.session.push_chat(&delta.text).to_owned();
                self.emit(SessionEvent::AssistantText { text });
                Ok(Transition::ChatAppended)
            }
            (SessionPhase::Active, ServerFrame::Tts(chunk)) => self.tts(&chunk).await,
        }
    }

    fn asr(&mut self, asr: AsrResult) -> Transition {
        let is_final = asr.is_final();
        if !is_final && !asr.result.is_empty() {
            self.session.clear_transcript();
        }
        self.emit(SessionEvent::UserSpeech {
            text: asr.result,
            is_final,
        });

        if !is_final {
            return Transition::PartialTranscript;
        }

        let epoch = self.session.begin_turn();
        let reset = self.playback.reset(epoch);
        tracing::debug!(%epoch, reset, "final transcript opened a new turn");
        self.emit(SessionEvent::TurnStarted { epoch });
        Transition::TurnStarted { epoch, reset }
    }

    async fn tts(&mut self, chunk: &TtsChunk) -> DispatchResult {
        let pcm = chunk.pcm().map_err(|e| self.malformed(&e))?;
        let epoch = self.session.synthesis_epoch();
        let bytes = pcm.len();

        let outcome = if pcm.is_empty() {
            AppendOutcome::Accepted
        } else {
            self.playback.append(pcm, epoch).await
        };

        let previous = self.session.synthesis_phase();
        let phase = self
            .session
            .record_synthesis(chunk.is_complete(), self.playback.buffered_bytes() == 0);
        if phase != previous {
            self.emit(SessionEvent::Synthesis { epoch, phase });
        }

        if outcome.is_accepted() {
            return Ok(Transition::AudioQueued {
                epoch,
                bytes,
                phase,
            });
        }

        match outcome {
            AppendOutcome::Stale => {
                tracing::debug!(%epoch, bytes, "discarded audio of a superseded turn");
            }
            _ => {
                tracing::warn!(%epoch, bytes, ?outcome, "playback cannot keep up, audio dropped");
                self.emit(SessionEvent::AudioDropped { epoch, bytes });
            }
        }
        Ok(Transition::AudioDropped {
            epoch,
            bytes,
            outcome,
            phase,
        })
    }

    fn server_error(&self, err: ServerError) -> Transition {
        tracing::warn!(code = err.error_code, message = %err.error_msg, "server reported an error");
        self.emit(SessionEvent::ServerError {
            code: err.error_code,
            message: err.error_msg,
        });
        Transition::ServerError {
            code: err.error_code,
        }
    }

    /// The user aborted the current answer.
    pub fn interrupt(&mut self) -> DispatchResult {
        if !self.session.is_active() {
            return Err(self.inactive("abort"));
        }
        let epoch = self.session.interrupt();
        self.playback.reset(epoch);
        tracing::info!(%epoch, "answer aborted");
        self.emit(SessionEvent::Interrupted { epoch });
        Ok(Transition::Interrupted { epoch })
    }

    /// The user typed a chat line; it opens a new turn like a final transcript.
    pub fn typed_turn(&mut self, text: &str) -> DispatchResult {
        if !self.session.is_active() {
            return Err(self.inactive("chat"));
        }
        self.emit(SessionEvent::UserSpeech {
            text: text.to_owned(),
            is_final: true,
        });
        let epoch = self.session.begin_turn();
        let reset = self.playback.reset(epoch);
        self.emit(SessionEvent::TurnStarted { epoch });
        Ok(Transition::TurnStarted { epoch, reset })
    }

    /// Apply a notice from the playback subsystem.
    pub fn on_playback_notice(&mut self, notice: PlaybackNotice) -> DispatchResult {
        if self.session.is_closed() {
            return Err(Ignored::Closed);
        }
        match notice {
            PlaybackNotice::Drained(epoch) => {
                // A notice from between two chunks can arrive after the final
                // chunk was queued; only an empty buffer completes the turn.
                if self.playback.buffered_bytes() != 0
                    || !self.session.playback_drained(epoch)
                {
                    return Err(Ignored::StaleNotice);
                }
                self.emit(SessionEvent::Synthesis {
                    epoch,
                    phase: SynthesisPhase::Done,
                });
                Ok(Transition::SynthesisDone { epoch })
            }
            PlaybackNotice::Disabled(reason) => {
                if !self.session.disable_playback() {
                    return Err(Ignored::AlreadyDisabled);
                }
                tracing::error!(%reason, "playback disabled for the rest of the session");
                self.emit(SessionEvent::PlaybackDisabled { reason });
                Ok(Transition::PlaybackDisabled)
            }
        }
    }

    /// Enter `Closed`. Terminal; later calls are ignored.
    pub fn close(&mut self, reason: &str) -> DispatchResult {
        if !self.session.close() {
            return Err(Ignored::Closed);
        }
        tracing::info!(%reason, "session closed");
        self.emit(SessionEvent::Closed {
            reason: reason.to_owned(),
        });
        Ok(Transition::Closed)
    }

    fn inactive(&self, kind: &str) -> Ignored {
        if self.session.is_closed() {
            Ignored::Closed
        } else {
            Ignored::BeforeHello {
                kind: kind.to_owned(),
            }
        }
    }

    fn malformed(&self, err: &dyn std::error::Error) -> Ignored {
        if self.session.is_closed() {
            return Ignored::Closed;
        }
        Ignored::Malformed {
            reason: err.to_string(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
