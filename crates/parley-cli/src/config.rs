//! Layered client configuration.
//!
//! Precedence, lowest to highest:
//!
//! 1. built-in defaults ([`ClientSettings::default`]);
//! 2. the YAML file given with `--config`;
//! 3. environment variables (`PARLEY_URL`, `PARLEY_SPEAKER`,
//!    `PARLEY_LANGUAGE`, `.env` included) and command-line flags, both
//!    resolved by clap.
//!
//! The merged result is validated once, before anything connects.

use std::path::{Path, PathBuf};

use parley_core::{ClientSettings, validate_settings};
use parley_voice::{FileSinkFactory, NullSinkFactory, RodioSinkFactory, SinkFactory};

use crate::error::ClientError;
use crate::parser::Cli;

/// Where outbound speech comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioInput {
    /// Default input device.
    Microphone,
    /// A 16 kHz mono WAV replayed at real-time pace.
    Wav(PathBuf),
    /// No capture; the session is driven by typed chat.
    Disabled,
}

/// Where synthesized speech goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutput {
    Speakers,
    /// Raw PCM16 LE file.
    File(PathBuf),
    /// Received and buffered, never played.
    Discard,
}

impl AudioOutput {
    /// Factory the playback thread opens its sink through.
    pub fn sink_factory(&self) -> Box<dyn SinkFactory> {
        match self {
            Self::Speakers => Box::new(RodioSinkFactory),
            Self::File(path) => Box::new(FileSinkFactory::new(path)),
            Self::Discard => Box::new(NullSinkFactory),
        }
    }
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub settings: ClientSettings,
    pub input: AudioInput,
    pub output: AudioOutput,
}

impl ClientConfig {
    /// Merge defaults, the optional config file and the parsed flags.
    pub fn from_cli(cli: &Cli) -> Result<Self, ClientError> {
        let mut settings = match &cli.config {
            Some(path) => load_settings_file(path)?,
            None => ClientSettings::default(),
        };
        apply_flags(&mut settings, cli);
        validate_settings(&settings)?;

        let input = if !settings.enable_asr {
            AudioInput::Disabled
        } else if let Some(path) = &cli.input_wav {
            AudioInput::Wav(path.clone())
        } else {
            AudioInput::Microphone
        };

        let output = if let Some(path) = &cli.output_pcm {
            AudioOutput::File(path.clone())
        } else if cli.no_playback || !settings.enable_tts {
            AudioOutput::Discard
        } else {
            AudioOutput::Speakers
        };

        Ok(Self {
            settings,
            input,
            output,
        })
    }
}

/// Read a YAML settings file. Missing keys keep their defaults.
pub fn load_settings_file(path: &Path) -> Result<ClientSettings, ClientError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
    let settings = serde_yaml::from_str(&text)
        .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded settings file");
    Ok(settings)
}

fn apply_flags(settings: &mut ClientSettings, cli: &Cli) {
    if let Some(url) = &cli.url {
        settings.url.clone_from(url);
    }
    if cli.no_asr {
        settings.enable_asr = false;
    }
    if let Some(speaker) = &cli.speaker {
        settings.tts.speaker.clone_from(speaker);
    }
    if let Some(language) = &cli.language {
        settings.asr.language.clone_from(language);
        settings.tts.language.clone_from(language);
    }
    if let Some(seconds) = cli.buffer_seconds {
        settings.playback.set_buffer_seconds(seconds);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use parley_core::{DEFAULT_SERVER_URL, PCM_BYTES_PER_SECOND};

    use super::*;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = ClientConfig::from_cli(&Cli::default()).unwrap();
        assert_eq!(config.settings.url, DEFAULT_SERVER_URL);
        assert_eq!(config.input, AudioInput::Microphone);
        assert_eq!(config.output, AudioOutput::Speakers);
    }

    #[test]
    fn test_file_then_flags() {
        let file = yaml_file(
            "url: ws://dialogue.local:9000/v1\n\
             tts:\n  speaker: from_file\n  volume: 80\n\
             playback:\n  shutdown_grace_ms: 500\n",
        );
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            speaker: Some("from_flag".into()),
            language: Some("en".into()),
            ..Cli::default()
        };

        let config = ClientConfig::from_cli(&cli).unwrap();
        let settings = &config.settings;
        assert_eq!(settings.url, "ws://dialogue.local:9000/v1");
        assert_eq!(settings.tts.speaker, "from_flag");
        assert_eq!(settings.tts.volume, 80);
        assert_eq!(settings.asr.language, "en");
        assert_eq!(settings.tts.language, "en");
        assert_eq!(settings.playback.shutdown_grace_ms, 500);
        // Untouched keys keep their defaults.
        assert_eq!(settings.asr.vad_eos, 800);
    }

    #[test]
    fn test_buffer_seconds() {
        let cli = Cli {
            buffer_seconds: Some(4),
            ..Cli::default()
        };
        let config = ClientConfig::from_cli(&cli).unwrap();
        assert_eq!(
            config.settings.playback.buffer_capacity_bytes,
            4 * PCM_BYTES_PER_SECOND
        );
    }

    #[test]
    fn test_audio_choices() {
        let cli = Cli {
            no_asr: true,
            no_playback: true,
            ..Cli::default()
        };
        let config = ClientConfig::from_cli(&cli).unwrap();
        assert_eq!(config.input, AudioInput::Disabled);
        assert_eq!(config.output, AudioOutput::Discard);
        assert!(!config.settings.enable_asr);
        // Speech is still requested so the answer can be discarded locally.
        assert!(config.settings.enable_tts);

        let cli = Cli {
            input_wav: Some("q.wav".into()),
            output_pcm: Some("a.pcm".into()),
            ..Cli::default()
        };
        let config = ClientConfig::from_cli(&cli).unwrap();
        assert_eq!(config.input, AudioInput::Wav("q.wav".into()));
        assert_eq!(config.output, AudioOutput::File("a.pcm".into()));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cli = Cli {
            url: Some("http://wrong.scheme".into()),
            ..Cli::default()
        };
        assert!(matches!(
            ClientConfig::from_cli(&cli),
            Err(ClientError::Config(_))
        ));

        let file = yaml_file("asr:\n  sample_rate: 44100\n");
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Cli::default()
        };
        assert!(matches!(
            ClientConfig::from_cli(&cli),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_unreadable_file() {
        let cli = Cli {
            config: Some("/no/such/parley.yaml".into()),
            ..Cli::default()
        };
        let err = ClientConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("parley.yaml"));
    }

    #[test]
    fn test_malformed_yaml() {
        let file = yaml_file("playback: [not, a, map]\n");
        assert!(load_settings_file(file.path()).is_err());
    }
}
