//! Duplex WebSocket channel to the dialogue service.
//!
//! The socket is split after connect: a writer task owns the sink and
//! drains a bounded queue of outbound messages (control frames and capture
//! audio share it, so FIFO order holds and a slow link pushes back on
//! capture), while the session task reads inbound frames directly.

use bytes::Bytes;
use std::fmt::Display;

use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use parley_core::ClientFrame;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open connection.
pub struct Connection {
    pub sender: ChannelSender,
    pub receiver: ChannelReceiver,
    /// Writer task; finishes after a close frame or once every sender is gone.
    pub writer: JoinHandle<()>,
    /// Cancelled when the writer stops on a send error.
    pub failed: CancellationToken,
}

/// Connect to `url` and start the writer task.
pub async fn connect(url: &str, queue: usize) -> Result<Connection, ClientError> {
    let (socket, response) = connect_async(url)
        .await
        .map_err(|e| ClientError::Connect {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
    tracing::info!(%url, status = %response.status(), "connected to dialogue service");

    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(queue.max(1));
    let failed = CancellationToken::new();
    let writer = tokio::spawn(write_loop(sink, rx, failed.clone()));

    Ok(Connection {
        sender: ChannelSender { tx },
        receiver: ChannelReceiver { stream },
        writer,
        failed,
    })
}

async fn write_loop<S>(mut sink: S, mut outbound: mpsc::Receiver<Message>, failed: CancellationToken)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut sent = 0_u64;
    while let Some(message) = outbound.recv().await {
        let closing = message.is_close();
        if let Err(e) = sink.send(message).await {
            if closing {
                tracing::debug!(error = %e, "close frame not delivered");
            } else {
                tracing::warn!(error = %e, "send failed, writer stopping");
                failed.cancel();
            }
            return;
        }
        sent += 1;
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
    tracing::debug!(messages = sent, "channel writer finished");
}

/// Cloneable handle for queueing outbound messages.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<Message>,
}

impl ChannelSender {
    /// Queue a JSON control frame.
    pub async fn send_frame(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        let text = frame
            .encode()
            .map_err(|e| ClientError::Channel(e.to_string()))?;
        tracing::debug!(kind = frame.kind(), "sending control frame");
        self.push(Message::text(text)).await
    }

    /// Queue one binary frame of capture audio. Waits while the queue is full.
    pub async fn send_audio(&self, pcm: Bytes) -> Result<(), ClientError> {
        self.push(Message::binary(pcm)).await
    }

    /// Queue a close frame; the writer stops after sending it.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.push(Message::Close(None)).await
    }

    async fn push(&self, message: Message) -> Result<(), ClientError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ClientError::Channel("connection writer stopped".to_owned()))
    }
}

/// One inbound event from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A JSON control frame.
    Text(String),
    /// The service closed the connection.
    Closed(String),
    /// The connection broke.
    Failed(String),
}

/// Read half of the connection.
pub struct ChannelReceiver {
    stream: SplitStream<WsStream>,
}

impl ChannelReceiver {
    /// Next inbound event; `None` once the stream has ended.
    ///
    /// Cancel-safe: nothing is lost if the future is dropped between frames.
    pub async fn next(&mut self) -> Option<Inbound> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Inbound::Failed(e.to_string())),
            };
            match message {
                Message::Text(text) => return Some(Inbound::Text(text.as_str().to_owned())),
                Message::Close(frame) => {
                    let reason = frame.map_or_else(
                        || "closed by server".to_owned(),
                        |f| format!("closed by server ({}): {}", u16::from(f.code), f.reason.as_str()),
                    );
                    return Some(Inbound::Closed(reason));
                }
                Message::Binary(data) => {
                    tracing::debug!(bytes = data.len(), "ignoring binary frame from server");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}
