//! WAV file capture source.
//!
//! Streams a 16 kHz mono PCM16 WAV at real-time pace, as if it were spoken
//! into the microphone, then appends a stretch of silence so the service's
//! end-of-speech detection can close the utterance.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use hound::{SampleFormat, WavReader};
use parley_core::{CaptureSettings, PCM_SAMPLE_RATE};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capture::CaptureStream;
use crate::error::VoiceError;

/// Options for [`open_wav`].
#[derive(Debug, Clone)]
pub struct WavSourceOptions {
    /// Sleep one frame duration between frames.
    pub realtime: bool,
    /// Silence appended after the last sample.
    pub trailing_silence: Duration,
}

impl Default for WavSourceOptions {
    fn default() -> Self {
        Self {
            realtime: true,
            trailing_silence: Duration::from_millis(1_500),
        }
    }
}

/// Start streaming `path` as capture frames.
///
/// The header is validated up front: the file must be 16 kHz, mono,
/// 16-bit integer PCM.
pub fn open_wav(
    path: &Path,
    settings: &CaptureSettings,
    options: WavSourceOptions,
    stop: CancellationToken,
) -> Result<CaptureStream, VoiceError> {
    let reader = WavReader::open(path).map_err(|e| wav_error(path, &e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_rate != PCM_SAMPLE_RATE
        || spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != SampleFormat::Int
    {
        return Err(wav_error(
            path,
            &format!(
                "expected 16000 Hz mono 16-bit PCM, found {} Hz {} ch {}-bit {:?}",
                spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
            ),
        ));
    }

    tracing::info!(
        path = %path.display(),
        seconds = reader.duration() / PCM_SAMPLE_RATE,
        "streaming WAV input"
    );

    let (frame_tx, frame_rx) = mpsc::channel(settings.queue_frames.max(1));
    let frame_samples = settings.frame_samples.max(1);
    let thread_stop = stop.clone();
    let source = path.to_path_buf();

    let thread = thread::Builder::new()
        .name("parley-wav".into())
        .spawn(move || stream_wav(reader, &source, frame_samples, &options, &frame_tx, &thread_stop))
        .map_err(|e| VoiceError::AudioThread(format!("failed to spawn WAV thread: {e}")))?;

    Ok(CaptureStream::new(frame_rx, stop, thread))
}

fn wav_error(path: &Path, reason: &str) -> VoiceError {
    VoiceError::WavInput {
        path: path.to_path_buf(),
        reason: reason.to_owned(),
    }
}

fn stream_wav(
    mut reader: WavReader<BufReader<File>>,
    source: &Path,
    frame_samples: usize,
    options: &WavSourceOptions,
    frames: &mpsc::Sender<Bytes>,
    stop: &CancellationToken,
) {
    #[allow(clippy::cast_precision_loss)]
    let frame_duration =
        Duration::from_secs_f64(frame_samples as f64 / f64::from(PCM_SAMPLE_RATE));
    let silence_frames = options.trailing_silence.as_nanos() / frame_duration.as_nanos().max(1);

    let mut samples = reader.samples::<i16>();
    let mut next_due = Instant::now();
    let mut sent = 0_u64;
    let mut silence_left = silence_frames;

    while !stop.is_cancelled() {
        let mut frame = Vec::with_capacity(frame_samples * 2);
        for sample in samples.by_ref().take(frame_samples) {
            match sample {
                Ok(value) => frame.extend_from_slice(&value.to_le_bytes()),
                Err(e) => {
                    tracing::warn!(path = %source.display(), error = %e, "WAV read error, ending input");
                    break;
                }
            }
        }

        if frame.is_empty() {
            if silence_left == 0 {
                break;
            }
            silence_left -= 1;
            frame.resize(frame_samples * 2, 0);
        }

        if options.realtime {
            let now = Instant::now();
            if next_due > now {
                thread::sleep(next_due - now);
            }
            next_due += frame_duration;
        }

        if frames.blocking_send(Bytes::from(frame)).is_err() {
            return;
        }
        sent += 1;
    }

    tracing::debug!(path = %source.display(), frames = sent, "WAV input finished");
}
