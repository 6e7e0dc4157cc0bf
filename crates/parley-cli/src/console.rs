//! Live transcript on the terminal.
//!
//! The user's partial transcript is rewritten in place until it turns final;
//! the assistant's answer is printed incrementally as text deltas arrive.
//! Notices (errors, dropped audio, interruptions) get their own coloured
//! lines. Logs go to stderr, so stdout carries only the conversation.

use std::io::{self, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use parley_core::{SessionEvent, SynthesisPhase};

use crate::commands::HELP;

/// Presentation seam for session events.
pub trait Renderer: Send {
    fn render(&mut self, event: &SessionEvent);

    /// Show the command list.
    fn help(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenLine {
    Partial,
    Assistant,
}

/// [`Renderer`] writing to a terminal (or any writer, in tests).
pub struct Console<W: Write + Send> {
    out: W,
    open: Option<OpenLine>,
    /// Bytes of the current answer already printed.
    assistant_shown: usize,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> Console<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out,
            open: None,
            assistant_shown: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.open.take().is_some() {
            queue!(self.out, Print("\n"))?;
        }
        Ok(())
    }

    fn notice(&mut self, color: Color, text: &str) -> io::Result<()> {
        self.end_line()?;
        queue!(
            self.out,
            SetForegroundColor(color),
            Print(text),
            ResetColor,
            Print("\n")
        )
    }

    fn user_speech(&mut self, text: &str, is_final: bool) -> io::Result<()> {
        if self.open == Some(OpenLine::Partial) {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        } else {
            self.end_line()?;
        }
        queue!(
            self.out,
            SetForegroundColor(Color::Cyan),
            Print("you> "),
            ResetColor,
            Print(text)
        )?;
        if is_final {
            queue!(self.out, Print("\n"))?;
            self.open = None;
        } else {
            self.open = Some(OpenLine::Partial);
        }
        Ok(())
    }

    fn assistant_text(&mut self, text: &str) -> io::Result<()> {
        let continues = self.assistant_shown <= text.len() && text.is_char_boundary(self.assistant_shown);
        if !continues {
            self.assistant_shown = 0;
        }
        if self.open != Some(OpenLine::Assistant) {
            self.end_line()?;
            queue!(
                self.out,
                SetForegroundColor(Color::Yellow),
                Print("bot> "),
                ResetColor
            )?;
            self.open = Some(OpenLine::Assistant);
        }
        queue!(self.out, Print(&text[self.assistant_shown..]))?;
        self.assistant_shown = text.len();
        Ok(())
    }

    fn write_event(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::Connected { session_id } => {
                let id = session_id.as_deref().unwrap_or("-");
                self.notice(
                    Color::Green,
                    &format!("connected (session {id}); speak or type, `help` for commands"),
                )?;
            }
            SessionEvent::UserSpeech { text, is_final } => self.user_speech(text, *is_final)?,
            SessionEvent::AssistantText { text } => self.assistant_text(text)?,
            SessionEvent::TurnStarted { .. } => {
                self.assistant_shown = 0;
                if self.open == Some(OpenLine::Assistant) {
                    self.end_line()?;
                }
            }
            SessionEvent::Interrupted { .. } => {
                self.assistant_shown = 0;
                self.notice(Color::DarkGrey, "(answer interrupted)")?;
            }
            SessionEvent::Synthesis { phase, .. } => {
                if *phase == SynthesisPhase::Done && self.open == Some(OpenLine::Assistant) {
                    self.end_line()?;
                }
            }
            SessionEvent::AudioDropped { bytes, .. } => {
                self.notice(
                    Color::DarkYellow,
                    &format!("[{bytes} bytes of audio dropped, playback is falling behind]"),
                )?;
            }
            SessionEvent::ServerError { code, message } => {
                self.notice(Color::Red, &format!("server error {code}: {message}"))?;
            }
            SessionEvent::PlaybackDisabled { reason } => {
                self.notice(Color::Red, &format!("playback disabled: {reason}"))?;
            }
            SessionEvent::Closed { reason } => {
                self.notice(Color::DarkGrey, &format!("session closed: {reason}"))?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write + Send> Renderer for Console<W> {
    fn render(&mut self, event: &SessionEvent) {
        if let Err(e) = self.write_event(event) {
            tracing::debug!(error = %e, "console write failed");
        }
    }

    fn help(&mut self) {
        let result = self
            .notice(Color::Reset, HELP)
            .and_then(|()| self.out.flush());
        if let Err(e) = result {
            tracing::debug!(error = %e, "console write failed");
        }
    }
}
