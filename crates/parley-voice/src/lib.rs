#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod audio_io;
pub mod buffer;
pub mod capture;
pub mod engine;
pub mod error;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod sink;
pub mod wav;

// Re-export key types for convenience
pub use audio_io::{PcmFormat, PcmSink, SinkError, SinkFactory};
pub use buffer::{DrainedChunk, PlaybackBuffer};
pub use capture::{CaptureStream, Framer, InputDeviceInfo, default_input_device, open_microphone};
pub use engine::PlaybackEngine;
pub use error::VoiceError;
pub use output::{FileSinkFactory, NullSinkFactory, RodioSinkFactory};
pub use playback::{LoopConfig, LoopReport, PlaybackLoop};
pub use sink::{SinkAdapter, WriteOutcome};
pub use wav::{WavSourceOptions, open_wav};
