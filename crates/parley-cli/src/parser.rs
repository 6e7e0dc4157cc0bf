//! Command-line parser.
//!
//! Flags sit on top of the YAML config file and the built-in defaults; see
//! [`crate::config`] for the layering.

use std::path::PathBuf;

use clap::Parser;

/// Terminal client for a duplex speech-dialogue service.
///
/// Speak into the microphone (or stream a WAV file) and hear the answer.
/// Type `abort` to cut the current answer short, any other line to send it
/// as a chat turn, `exit` to quit.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "parley")]
#[command(about = "Talk to a duplex speech-dialogue service from the terminal")]
#[command(version)]
pub struct Cli {
    /// Dialogue service endpoint (ws:// or wss://)
    #[arg(long, env = "PARLEY_URL")]
    pub url: Option<String>,

    /// YAML settings file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Stream a 16 kHz mono PCM16 WAV file instead of the microphone
    #[arg(long = "input-wav", value_name = "PATH")]
    pub input_wav: Option<PathBuf>,

    /// Write received speech to a raw PCM16 LE file instead of the speakers
    #[arg(long = "output-pcm", value_name = "PATH", conflicts_with = "no_playback")]
    pub output_pcm: Option<PathBuf>,

    /// Do not play synthesized speech
    #[arg(long = "no-playback")]
    pub no_playback: bool,

    /// Do not capture audio; typed chat only
    #[arg(long = "no-asr", conflicts_with = "input_wav")]
    pub no_asr: bool,

    /// Synthesis voice
    #[arg(long, env = "PARLEY_SPEAKER")]
    pub speaker: Option<String>,

    /// Recognition and synthesis language
    #[arg(long, env = "PARLEY_LANGUAGE")]
    pub language: Option<String>,

    /// Playback buffer size in seconds of audio
    #[arg(long = "buffer-seconds", value_parser = clap::value_parser!(u32).range(1..=600))]
    pub buffer_seconds: Option<u32>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
