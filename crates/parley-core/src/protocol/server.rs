//! Server → client frames.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use super::ProtocolError;
use super::client::{AsrParams, TtsParams};

/// A decoded inbound control frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Handshake acknowledgment.
    Hello(HelloAck),
    /// Partial or final transcript of the user's speech.
    Asr(AsrResult),
    /// Incremental assistant text.
    Chat(ChatDelta),
    /// Synthesized speech chunk.
    Tts(TtsChunk),
    /// Error reported by the service.
    Error(ServerError),
    /// Well-formed frame of a kind this client does not handle.
    Unknown { kind: String },
}

impl ServerFrame {
    /// Decode one JSON text frame.
    ///
    /// Unknown `type` values decode successfully into [`ServerFrame::Unknown`];
    /// only broken JSON or missing required fields are errors.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_owned();

        let frame = match kind.as_str() {
            "hello" => Self::Hello(serde_json::from_value(value)?),
            "asr" => Self::Asr(serde_json::from_value(value)?),
            "chat" => Self::Chat(serde_json::from_value(value)?),
            "tts" => Self::Tts(serde_json::from_value(value)?),
            "error" => Self::Error(serde_json::from_value(value)?),
            _ => Self::Unknown { kind },
        };
        Ok(frame)
    }

    /// The wire `type` of this frame.
    pub fn kind(&self) -> &str {
        match self {
            Self::Hello(_) => "hello",
            Self::Asr(_) => "asr",
            Self::Chat(_) => "chat",
            Self::Tts(_) => "tts",
            Self::Error(_) => "error",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Server `hello`: may echo the negotiated parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HelloAck {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub asr_params: Option<AsrParams>,
    #[serde(default)]
    pub tts_params: Option<TtsParams>,
}

/// `asr` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AsrResult {
    pub result: String,
    /// 0 while the utterance is still being recognized.
    pub state: i64,
}

impl AsrResult {
    /// Whether this transcript closes the user's utterance.
    pub const fn is_final(&self) -> bool {
        self.state != 0
    }
}

/// `chat` frame: a text delta of the assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatDelta {
    pub text: String,
}

/// `tts` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TtsChunk {
    /// Base64 PCM16 LE mono 16 kHz; may be empty.
    #[serde(default)]
    pub audio: String,
    /// 0 while more chunks follow, 1 once synthesis is complete.
    pub state: i64,
}

impl TtsChunk {
    /// Whether synthesis of the current answer is complete.
    pub const fn is_complete(&self) -> bool {
        self.state != 0
    }

    /// Decode the base64 payload into raw PCM bytes.
    pub fn pcm(&self) -> Result<Bytes, ProtocolError> {
        if self.audio.is_empty() {
            return Ok(Bytes::new());
        }
        Ok(Bytes::from(STANDARD.decode(self.audio.as_bytes())?))
    }
}

/// `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hello_with_session_id() {
        let frame =
            ServerFrame::decode(r#"{"type":"hello","session_id":"abc","extra":1}"#).unwrap();
        let ServerFrame::Hello(ack) = frame else {
            panic!("expected hello, got {frame:?}");
        };
        assert_eq!(ack.session_id.as_deref(), Some("abc"));
        assert!(ack.asr_params.is_none());
    }

    #[test]
    fn test_decode_asr_partial_and_final() {
        let partial = ServerFrame::decode(r#"{"type":"asr","result":"你","state":0}"#).unwrap();
        let final_ = ServerFrame::decode(r#"{"type":"asr","result":"你好","state":1}"#).unwrap();

        assert!(matches!(partial, ServerFrame::Asr(ref a) if !a.is_final()));
        assert!(matches!(final_, ServerFrame::Asr(ref a) if a.is_final() && a.result == "你好"));
    }

    #[test]
    fn test_decode_tts_payload() {
        let frame = ServerFrame::decode(r#"{"type":"tts","audio":"AAEC","state":0}"#).unwrap();
        let ServerFrame::Tts(chunk) = frame else {
            panic!("expected tts");
        };
        assert_eq!(chunk.pcm().unwrap().as_ref(), &[0u8, 1, 2]);
        assert!(!chunk.is_complete());
    }

    #[test]
    fn test_decode_tts_empty_audio_is_valid() {
        let frame = ServerFrame::decode(r#"{"type":"tts","state":1}"#).unwrap();
        let ServerFrame::Tts(chunk) = frame else {
            panic!("expected tts");
        };
        assert!(chunk.pcm().unwrap().is_empty());
        assert!(chunk.is_complete());
    }

    #[test]
    fn test_invalid_base64_is_reported_on_pcm() {
        let frame = ServerFrame::decode(r#"{"type":"tts","audio":"!!!","state":0}"#).unwrap();
        let ServerFrame::Tts(chunk) = frame else {
            panic!("expected tts");
        };
        assert!(matches!(chunk.pcm(), Err(ProtocolError::Audio(_))));
    }

    #[test]
    fn test_decode_error_frame() {
        let frame = ServerFrame::decode(
            r#"{"type":"error","error_code":4001,"error_msg":"bad params","session_id":"x"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Error(ServerError {
                error_code: 4001,
                error_msg: "bad params".to_owned()
            })
        );
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let frame = ServerFrame::decode(r#"{"type":"metrics","rtf":0.3}"#).unwrap();
        assert_eq!(frame.kind(), "metrics");
        assert!(matches!(frame, ServerFrame::Unknown { .. }));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            ServerFrame::decode("{not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ServerFrame::decode(r#"{"result":"x"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            ServerFrame::decode(r#"{"type":"asr","result":"x"}"#),
            Err(ProtocolError::Json(_))
        ));
    }
}
