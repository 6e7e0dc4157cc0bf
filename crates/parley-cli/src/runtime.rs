//! Session runtime: wires channel, dispatcher, playback and capture.
//!
//! One task owns the [`FrameDispatcher`] and feeds it, in arrival order,
//! inbound frames, user commands and playback notices. Capture runs as its
//! own task once the handshake is acknowledged; playback runs on the
//! engine's thread. Everything stops on the shared [`CancellationToken`]
//! or when the channel closes.
//!
//! ```text
//!  ws reader ─┐                               ┌─► PlaybackEngine (thread)
//!  commands ──┼─► select loop ─► dispatcher ──┤
//!  notices ───┘        │                      └─► SessionEvent ─► Renderer
//!                      └─ hello ack ─► capture task ─► ws writer
//! ```

use std::sync::Arc;
use std::time::Duration;

use parley_core::{ClientFrame, ClientSettings, FrameDispatcher, Transition};
use parley_voice::{
    CaptureStream, LoopReport, PlaybackEngine, SinkFactory, WavSourceOptions, open_microphone,
    open_wav,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{self, ChannelSender, Inbound};
use crate::commands::Command;
use crate::config::AudioInput;
use crate::console::Renderer;
use crate::error::ClientError;

/// How long the writer gets to flush the close frame.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything one session needs besides its command source and renderer.
pub struct SessionOptions {
    pub settings: ClientSettings,
    pub input: AudioInput,
    pub output: Box<dyn SinkFactory>,
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub close_reason: String,
    pub session_id: Option<String>,
    /// Binary capture frames sent upstream.
    pub audio_frames_sent: u64,
    /// `None` if the playback thread could not be joined.
    pub playback: Option<LoopReport>,
}

/// Run one session to completion.
///
/// Returns `Err` only when the service cannot be reached or the connection
/// breaks; a clean close by either side is `Ok`.
pub async fn run_session(
    options: SessionOptions,
    mut commands: mpsc::Receiver<Command>,
    renderer: &mut dyn Renderer,
    shutdown: CancellationToken,
) -> Result<SessionReport, ClientError> {
    let SessionOptions {
        settings,
        input,
        output,
    } = options;

    let connection = channel::connect(&settings.url, settings.capture.queue_frames).await?;
    let sender = connection.sender;
    let mut receiver = connection.receiver;
    let writer_failed = connection.failed;

    let playback_stop = CancellationToken::new();
    let (engine, mut notices) =
        PlaybackEngine::spawn(&settings.playback, output, playback_stop.clone())?;
    let engine = Arc::new(engine);
    let (mut dispatcher, mut events) = FrameDispatcher::new(Arc::clone(&engine));

    let capture_stop = shutdown.child_token();
    let mut capture: Option<JoinHandle<u64>> = None;
    let mut failure: Option<ClientError> = None;

    let close_reason = match sender.send_frame(&ClientFrame::Hello(settings.hello())).await {
        Ok(()) => loop {
            tokio::select! {
                () = shutdown.cancelled() => break "shutdown requested".to_owned(),

                () = writer_failed.cancelled() => {
                    failure = Some(ClientError::Channel("sending to the service failed".to_owned()));
                    break "connection writer failed".to_owned();
                }

                inbound = receiver.next() => match inbound {
                    Some(Inbound::Text(text)) => {
                        let result = dispatcher.dispatch_text(&text).await;
                        if matches!(result, Ok(Transition::Activated { .. })) && capture.is_none() {
                            capture = start_capture(&input, &settings, &sender, &capture_stop);
                        }
                    }
                    Some(Inbound::Closed(reason)) => break reason,
                    Some(Inbound::Failed(reason)) => {
                        failure = Some(ClientError::Channel(reason.clone()));
                        break reason;
                    }
                    None => break "connection ended".to_owned(),
                },

                Some(notice) = notices.recv() => {
                    let _ = dispatcher.on_playback_notice(notice);
                }

                Some(command) = commands.recv() => match command {
                    Command::Abort => {
                        if dispatcher.interrupt().is_ok() {
                            if let Err(e) = sender.send_frame(&ClientFrame::Abort).await {
                                failure = Some(e);
                                break "connection writer stopped".to_owned();
                            }
                        }
                    }
                    Command::Chat(text) => {
                        if dispatcher.typed_turn(&text).is_ok() {
                            let frame = ClientFrame::Chat { chat_text: text };
                            if let Err(e) = sender.send_frame(&frame).await {
                                failure = Some(e);
                                break "connection writer stopped".to_owned();
                            }
                        } else {
                            tracing::warn!("chat ignored: session not active yet");
                        }
                    }
                    Command::Help => renderer.help(),
                    Command::Exit => break "user exit".to_owned(),
                },

                Some(event) = events.recv() => renderer.render(&event),
            }
        },
        Err(e) => {
            failure = Some(e);
            "handshake could not be sent".to_owned()
        }
    };

    let _ = dispatcher.close(&close_reason);
    let session_id = dispatcher.session().session_id().map(str::to_owned);

    // Capture first, so no audio follows the close frame.
    capture_stop.cancel();
    let audio_frames_sent = match capture {
        Some(handle) => handle.await.unwrap_or_default(),
        None => 0,
    };

    let _ = sender.close().await;
    drop(sender);
    if tokio::time::timeout(WRITER_CLOSE_TIMEOUT, connection.writer)
        .await
        .is_err()
    {
        tracing::warn!("channel writer did not finish in time");
    }

    // Let what is buffered play out, bounded by the grace period.
    playback_stop.cancel();
    let playback = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.shutdown())
            .await
            .ok()
            .flatten()
    };

    while let Ok(event) = events.try_recv() {
        renderer.render(&event);
    }

    if let Some(e) = failure {
        return Err(e);
    }
    Ok(SessionReport {
        close_reason,
        session_id,
        audio_frames_sent,
        playback,
    })
}

/// Open the configured capture source and forward its frames upstream.
///
/// A capture source that cannot be opened leaves the session running on
/// typed chat alone.
fn start_capture(
    input: &AudioInput,
    settings: &ClientSettings,
    sender: &ChannelSender,
    stop: &CancellationToken,
) -> Option<JoinHandle<u64>> {
    let opened = match input {
        AudioInput::Disabled => return None,
        AudioInput::Microphone => open_microphone(&settings.capture, stop.clone()),
        AudioInput::Wav(path) => open_wav(
            path,
            &settings.capture,
            WavSourceOptions::default(),
            stop.clone(),
        ),
    };

    match opened {
        Ok(stream) => {
            tracing::info!(source = ?input, "capture started");
            Some(tokio::spawn(forward_capture(
                stream,
                sender.clone(),
                stop.clone(),
            )))
        }
        Err(e) => {
            tracing::error!(error = %e, "capture unavailable, continuing with typed chat only");
            None
        }
    }
}

async fn forward_capture(
    mut stream: CaptureStream,
    sender: ChannelSender,
    stop: CancellationToken,
) -> u64 {
    let mut sent = 0_u64;
    loop {
        let frame = tokio::select! {
            () = stop.cancelled() => break,
            frame = stream.next_frame() => frame,
        };
        let Some(frame) = frame else {
            tracing::debug!(frames = sent, "capture source ended");
            break;
        };
        if let Err(e) = sender.send_audio(frame).await {
            tracing::warn!(error = %e, frames = sent, "capture audio could not be sent");
            break;
        }
        sent += 1;
    }

    // Joining the capture thread blocks briefly.
    let _ = tokio::task::spawn_blocking(move || drop(stream)).await;
    sent
}
