//! Interactive stdin commands.
//!
//! A blocking reader thread turns each line into a [`Command`] and hands it
//! to the session task. The thread ends at EOF or once the session stops
//! listening; it never holds session state itself.

use std::io::{self, BufRead};
use std::thread;

use tokio::sync::mpsc;

/// A user command, processed in order with inbound frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Cut the current answer short.
    Abort,
    /// Send a typed chat turn.
    Chat(String),
    /// Show the command list.
    Help,
    /// End the session.
    Exit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let command = match trimmed.to_ascii_lowercase().as_str() {
        "abort" | "/abort" => Command::Abort,
        "exit" | "quit" | "/exit" | "/quit" => Command::Exit,
        "help" | "/help" | "?" => Command::Help,
        _ => Command::Chat(trimmed.to_owned()),
    };
    Some(command)
}

/// Help text shown for [`Command::Help`].
pub const HELP: &str = "\
commands:
  abort        stop the answer that is playing
  exit, quit   end the session
  help         show this list
  <text>       send <text> as a chat turn";

/// Start the stdin reader thread.
pub fn spawn_stdin_listener(commands: mpsc::Sender<Command>) -> io::Result<()> {
    thread::Builder::new()
        .name("parley-stdin".into())
        .spawn(move || read_commands(io::stdin().lock(), &commands))?;
    Ok(())
}

fn read_commands(input: impl BufRead, commands: &mpsc::Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed, command input stopped");
                return;
            }
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        if commands.blocking_send(command).is_err() {
            return;
        }
    }
    tracing::debug!("stdin closed");
}
