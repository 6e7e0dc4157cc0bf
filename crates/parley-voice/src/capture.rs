//! Microphone capture via `cpal`.
//!
//! The cpal input stream is `!Send` on some platforms, so it lives on a
//! dedicated capture thread for its entire lifetime. The device callback
//! only converts samples to mono f32 and hands them to that thread, which
//! resamples to 16 kHz, packs fixed-size PCM16 LE frames and pushes them into
//! a bounded tokio channel. A full channel blocks the capture thread, never
//! the device callback.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parley_core::{CaptureSettings, PCM_SAMPLE_RATE};
use rubato::{FftFixedIn, Resampler as _};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;
use crate::pcm::{downmix_to_mono, f32_to_pcm16_le};

/// Resampler input block size (device-rate frames).
const RESAMPLE_CHUNK: usize = 1024;

/// How often the capture thread re-checks the stop signal while idle.
const STOP_POLL: Duration = Duration::from_millis(50);

/// A running capture source producing PCM16 LE 16 kHz mono frames.
///
/// Dropping the stream stops the source and joins its thread.
pub struct CaptureStream {
    frames: mpsc::Receiver<Bytes>,
    stop: CancellationToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl CaptureStream {
    pub(crate) fn new(
        frames: mpsc::Receiver<Bytes>,
        stop: CancellationToken,
        thread: thread::JoinHandle<()>,
    ) -> Self {
        Self {
            frames,
            stop,
            thread: Some(thread),
        }
    }

    /// Next captured frame; `None` once the source has ended.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Stop the source and wait for its thread.
    pub fn stop(&mut self) {
        self.stop.cancel();
        // Unblocks a capture thread waiting on a full channel.
        self.frames.close();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Information about the default input device, for startup logs.
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Describe the default input device without opening it.
pub fn default_input_device() -> Result<InputDeviceInfo, VoiceError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(VoiceError::NoInputDevice)?;
    let config = device
        .default_input_config()
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;
    Ok(InputDeviceInfo {
        name: device.name().unwrap_or_default(),
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}

/// Start capturing from the default microphone.
///
/// Device errors during setup are reported here; the stream only starts
/// yielding frames once this returns `Ok`.
pub fn open_microphone(
    settings: &CaptureSettings,
    stop: CancellationToken,
) -> Result<CaptureStream, VoiceError> {
    let (frame_tx, frame_rx) = mpsc::channel(settings.queue_frames.max(1));
    let (init_tx, init_rx) = std_mpsc::channel::<Result<(), VoiceError>>();
    let frame_samples = settings.frame_samples;
    let thread_stop = stop.clone();

    let thread = thread::Builder::new()
        .name("parley-capture".into())
        .spawn(move || run_microphone(frame_samples, &frame_tx, &init_tx, &thread_stop))
        .map_err(|e| VoiceError::AudioThread(format!("failed to spawn capture thread: {e}")))?;

    // Wait for the capture thread to finish device setup.
    match init_rx.recv() {
        Ok(Ok(())) => Ok(CaptureStream::new(frame_rx, stop, thread)),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => Err(VoiceError::AudioThread(
            "capture thread exited during setup".to_owned(),
        )),
    }
}

/// Body of the capture thread. Owns the cpal stream until it returns.
fn run_microphone(
    frame_samples: usize,
    frames: &mpsc::Sender<Bytes>,
    init: &std_mpsc::Sender<Result<(), VoiceError>>,
    stop: &CancellationToken,
) {
    let (raw_tx, raw_rx) = std_mpsc::channel::<Vec<f32>>();
    let setup = open_input_stream(raw_tx);
    let (stream, device_rate) = match setup {
        Ok(opened) => opened,
        Err(e) => {
            let _ = init.send(Err(e));
            return;
        }
    };

    let mut framer = match Framer::new(device_rate, frame_samples) {
        Ok(framer) => framer,
        Err(e) => {
            let _ = init.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = init.send(Err(VoiceError::InputStreamError(e.to_string())));
        return;
    }
    let _ = init.send(Ok(()));
    tracing::debug!(device_rate, "microphone capture started");

    while !stop.is_cancelled() {
        let samples = match raw_rx.recv_timeout(STOP_POLL) {
            Ok(samples) => samples,
            Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        };

        let ready = match framer.push(&samples) {
            Ok(ready) => ready,
            Err(e) => {
                tracing::error!(error = %e, "resampling failed, stopping capture");
                break;
            }
        };
        for frame in ready {
            if frames.blocking_send(frame).is_err() {
                tracing::debug!("capture consumer gone");
                return;
            }
        }
    }

    drop(stream);
    tracing::debug!("microphone capture stopped");
}

/// Open the default input device; the callback forwards mono f32 blocks.
fn open_input_stream(raw_tx: std_mpsc::Sender<Vec<f32>>) -> Result<(Stream, u32), VoiceError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(VoiceError::NoInputDevice)?;
    let supported = device
        .default_input_config()
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: StreamConfig = supported.config();

    tracing::info!(
        device = %device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio capture initialized"
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, raw_tx),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, raw_tx),
        SampleFormat::I32 => build_stream::<i32>(&device, &config, channels, raw_tx),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, raw_tx),
        other => Err(VoiceError::InputStreamError(format!(
            "Unsupported sample format: {other:?}"
        ))),
    }?;
    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: u16,
    raw_tx: std_mpsc::Sender<Vec<f32>>,
) -> Result<Stream, VoiceError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                let _ = raw_tx.send(downmix_to_mono(&samples, channels));
            },
            |err: cpal::StreamError| {
                tracing::error!(%err, "audio input stream error");
            },
            None,
        )
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))
}

/// Streaming resampler + fixed-size framer: device-rate mono f32 in,
/// 16 kHz PCM16 LE frames out.
pub struct Framer {
    resampler: Option<FftFixedIn<f32>>,
    pending_in: Vec<f32>,
    pending_out: Vec<f32>,
    frame_samples: usize,
}

impl Framer {
    pub fn new(device_rate: u32, frame_samples: usize) -> Result<Self, VoiceError> {
        let resampler = if device_rate == PCM_SAMPLE_RATE {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(
                    device_rate as usize,
                    PCM_SAMPLE_RATE as usize,
                    RESAMPLE_CHUNK,
                    2, // sub-chunks for quality
                    1, // mono
                )
                .map_err(|e| VoiceError::ResampleError(e.to_string()))?,
            )
        };
        Ok(Self {
            resampler,
            pending_in: Vec::new(),
            pending_out: Vec::new(),
            frame_samples: frame_samples.max(1),
        })
    }

    /// Feed device samples; returns every complete frame now available.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<Bytes>, VoiceError> {
        match self.resampler.as_mut() {
            None => self.pending_out.extend_from_slice(samples),
            Some(resampler) => {
                self.pending_in.extend_from_slice(samples);
                loop {
                    let needed = resampler.input_frames_next();
                    if self.pending_in.len() < needed {
                        break;
                    }
                    let block: Vec<f32> = self.pending_in.drain(..needed).collect();
                    let output = resampler
                        .process(&[block], None)
                        .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
                    if let Some(channel) = output.first() {
                        self.pending_out.extend_from_slice(channel);
                    }
                }
            }
        }

        let mut frames = Vec::new();
        while self.pending_out.len() >= self.frame_samples {
            let frame: Vec<f32> = self.pending_out.drain(..self.frame_samples).collect();
            frames.push(Bytes::from(f32_to_pcm16_le(&frame)));
        }
        Ok(frames)
    }
}
