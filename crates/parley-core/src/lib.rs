#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod dispatch;
pub mod events;
pub mod ports;
pub mod protocol;
pub mod session;
pub mod settings;

// Re-export commonly used types for convenience
pub use dispatch::{DispatchResult, FrameDispatcher, Ignored, Transition};
pub use events::SessionEvent;
pub use ports::{AppendOutcome, PlaybackNotice, PlaybackPort};
pub use protocol::{
    AsrParams, AsrResult, ChatDelta, ClientFrame, Hello, HelloAck, ProtocolError, ServerError,
    ServerFrame, TtsChunk, TtsParams,
};
pub use session::{Epoch, Session, SessionPhase, SynthesisPhase, Transcript};
pub use settings::{
    CaptureSettings, ClientSettings, DEFAULT_SERVER_URL, MAX_SHUTDOWN_GRACE,
    PCM_BYTES_PER_SECOND, PCM_SAMPLE_RATE, PlaybackSettings, SettingsError, validate_settings,
};
