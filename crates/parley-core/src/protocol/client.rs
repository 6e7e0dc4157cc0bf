//! Client → server frames.

use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Frames the client sends as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Session handshake, sent once right after connect.
    Hello(Hello),

    /// A typed user turn; the service treats it like a final transcript.
    Chat { chat_text: String },

    /// Ask the service to stop the answer in progress.
    Abort,
}

impl ClientFrame {
    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The wire `type` of this frame, for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Chat { .. } => "chat",
            Self::Abort => "abort",
        }
    }
}

/// Payload of the client `hello` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub enable_asr: bool,
    pub enable_tts: bool,
    pub asr_params: AsrParams,
    pub tts_params: TtsParams,
}

/// Recognition parameters negotiated in the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrParams {
    /// Container the service should assume for uploaded audio.
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Trailing silence (ms) that ends an utterance.
    pub vad_eos: u32,
    pub enable_punc: bool,
    pub language: String,
    pub accent: String,
}

impl Default for AsrParams {
    fn default() -> Self {
        Self {
            format: "wav".to_owned(),
            sample_rate: 16_000,
            channels: 1,
            vad_eos: 800,
            enable_punc: true,
            language: "zh".to_owned(),
            accent: "mandarin".to_owned(),
        }
    }
}

/// Synthesis parameters negotiated in the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsParams {
    pub speaker: String,
    /// Only `pcm` is playable by this client.
    pub format: String,
    pub speed: f32,
    pub volume: u32,
    pub pitch: f32,
    pub sample_rate: u32,
    pub language: String,
}

impl Default for TtsParams {
    fn default() -> Self {
        Self {
            speaker: "longlaotie_v2".to_owned(),
            format: "pcm".to_owned(),
            speed: 1.0,
            volume: 50,
            pitch: 1.0,
            sample_rate: 16_000,
            language: "zh".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn encoded(frame: &ClientFrame) -> Value {
        serde_json::from_str(&frame.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_hello_shape() {
        let frame = ClientFrame::Hello(Hello {
            enable_asr: true,
            enable_tts: true,
            asr_params: AsrParams::default(),
            tts_params: TtsParams::default(),
        });

        let value = encoded(&frame);
        assert_eq!(value["type"], "hello");
        assert_eq!(value["enable_asr"], true);
        assert_eq!(value["asr_params"]["sample_rate"], 16_000);
        assert_eq!(value["asr_params"]["vad_eos"], 800);
        assert_eq!(value["asr_params"]["accent"], "mandarin");
        assert_eq!(value["tts_params"]["speaker"], "longlaotie_v2");
        assert_eq!(value["tts_params"]["format"], "pcm");
        assert_eq!(value["tts_params"]["volume"], 50);
    }

    #[test]
    fn test_abort_and_chat_shape() {
        assert_eq!(encoded(&ClientFrame::Abort), json!({"type": "abort"}));
        assert_eq!(
            encoded(&ClientFrame::Chat {
                chat_text: "你好".to_owned()
            }),
            json!({"type": "chat", "chat_text": "你好"})
        );
    }

    #[test]
    fn test_params_fill_missing_fields_with_defaults() {
        let params: TtsParams = serde_json::from_str(r#"{"speaker":"other"}"#).unwrap();
        assert_eq!(params.speaker, "other");
        assert_eq!(params.sample_rate, 16_000);
    }
}
