//! Control-frame wire format.
//!
//! Every control frame is a JSON object with a `type` discriminator. Inbound
//! frames decode into the closed [`ServerFrame`] enum; unknown kinds survive
//! as [`ServerFrame::Unknown`] so the dispatcher can log and skip them.
//! Outbound frames are built from [`ClientFrame`].
//!
//! Audio never travels in control frames upstream: microphone PCM goes out as
//! binary frames. Downstream speech arrives base64-encoded inside `tts`.

mod client;
mod server;

pub use client::{AsrParams, ClientFrame, Hello, TtsParams};
pub use server::{AsrResult, ChatDelta, HelloAck, ServerError, ServerFrame, TtsChunk};

/// Errors raised while decoding or encoding control frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON or a required field is missing/mistyped.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is a JSON value without a string `type` field.
    #[error("frame has no string `type` discriminator")]
    MissingType,

    /// `tts.audio` is not valid base64.
    #[error("invalid base64 audio payload: {0}")]
    Audio(#[from] base64::DecodeError),
}
