//! Playback behaviour observed from outside: ordering, barge-in, bounds and
//! shutdown, driven through `PlaybackEngine` with a recording device.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parley_core::{AppendOutcome, Epoch, PlaybackNotice, PlaybackPort, PlaybackSettings};
use parley_voice::{
    PcmFormat, PcmSink, PlaybackBuffer, PlaybackEngine, SinkError, SinkFactory,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Device {
    played: Vec<u8>,
    stops: usize,
    /// Chunks the fake device reports as still queued.
    queue: usize,
    /// When set, written chunks stay queued until `stop`.
    hold: bool,
}

#[derive(Clone, Default)]
struct RecordingFactory {
    device: Arc<Mutex<Device>>,
    write_delay: Duration,
}

impl RecordingFactory {
    fn with_delay(write_delay: Duration) -> Self {
        Self {
            write_delay,
            ..Self::default()
        }
    }

    fn played(&self) -> Vec<u8> {
        self.device.lock().unwrap().played.clone()
    }

    fn set_hold(&self, hold: bool) {
        self.device.lock().unwrap().hold = hold;
    }

    fn stops(&self) -> usize {
        self.device.lock().unwrap().stops
    }
}

impl SinkFactory for RecordingFactory {
    fn open(&mut self, _format: PcmFormat) -> Result<Box<dyn PcmSink>, SinkError> {
        Ok(Box::new(RecordingSink {
            device: Arc::clone(&self.device),
            write_delay: self.write_delay,
        }))
    }

    fn describe(&self) -> String {
        "recording device".to_owned()
    }
}

struct RecordingSink {
    device: Arc<Mutex<Device>>,
    write_delay: Duration,
}

impl PcmSink for RecordingSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        let mut device = self.device.lock().unwrap();
        device.played.extend_from_slice(pcm);
        if device.hold {
            device.queue += 1;
        }
        Ok(())
    }

    fn queued(&self) -> usize {
        self.device.lock().unwrap().queue
    }

    fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn stop(&mut self) {
        let mut device = self.device.lock().unwrap();
        device.queue = 0;
        device.stops += 1;
    }

    fn close(&mut self) {}
}

fn settings(capacity: usize, chunk: usize) -> PlaybackSettings {
    PlaybackSettings {
        buffer_capacity_bytes: capacity,
        chunk_bytes: chunk,
        append_timeout_ms: 2_000,
        idle_poll_ms: 1,
        shutdown_grace_ms: 1_000,
        device_queue_chunks: 2,
    }
}

async fn next_notice(notices: &mut mpsc::UnboundedReceiver<PlaybackNotice>) -> PlaybackNotice {
    tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("no playback notice within 5s")
        .expect("notice channel closed")
}

#[tokio::test]
async fn every_accepted_byte_plays_once_in_order() {
    let factory = RecordingFactory::default();
    let (engine, mut notices) = PlaybackEngine::spawn(
        &settings(64, 16),
        Box::new(factory.clone()),
        CancellationToken::new(),
    )
    .unwrap();

    let mut expected = Vec::new();
    for i in 0..40_u8 {
        let chunk = vec![i; usize::from(i % 7) + 1];
        expected.extend_from_slice(&chunk);
        let outcome = engine.append(Bytes::from(chunk), Epoch::ZERO).await;
        assert_eq!(outcome, AppendOutcome::Accepted, "chunk {i}");
        assert!(engine.buffered_bytes() <= 64);
    }

    // The loop may go idle between appends; wait until everything played.
    let deadline = Instant::now() + Duration::from_secs(5);
    while factory.played().len() < expected.len() && Instant::now() < deadline {
        let _ = next_notice(&mut notices).await;
    }

    let report = engine.shutdown().unwrap();
    assert_eq!(factory.played(), expected);
    assert_eq!(report.bytes_written, expected.len() as u64);
    assert_eq!(report.bytes_abandoned, 0);
}

#[tokio::test]
async fn barge_in_never_plays_superseded_audio() {
    let factory = RecordingFactory::default();
    let (engine, mut notices) = PlaybackEngine::spawn(
        &settings(1_024, 16),
        Box::new(factory.clone()),
        CancellationToken::new(),
    )
    .unwrap();

    let first = Epoch::new(1);
    let second = Epoch::new(2);
    assert!(engine.reset(first));
    assert_eq!(
        engine.append(Bytes::from_static(b"AAAA"), first).await,
        AppendOutcome::Accepted
    );
    assert_eq!(next_notice(&mut notices).await, PlaybackNotice::Drained(first));

    assert!(engine.reset(second));
    // Late audio of the first answer.
    assert_eq!(
        engine.append(Bytes::from_static(b"CCCC"), first).await,
        AppendOutcome::Stale
    );
    assert_eq!(
        engine.append(Bytes::from_static(b"DDDD"), second).await,
        AppendOutcome::Accepted
    );
    assert_eq!(next_notice(&mut notices).await, PlaybackNotice::Drained(second));

    let report = engine.shutdown().unwrap();
    assert_eq!(factory.played(), b"AAAADDDD");
    assert!(report.interrupts >= 1);
}

#[tokio::test]
async fn barge_in_stops_device_and_skips_rest_of_answer() {
    let factory = RecordingFactory::default();
    let mut config = settings(1_024, 4);
    config.device_queue_chunks = 0;
    let (engine, mut notices) =
        PlaybackEngine::spawn(&config, Box::new(factory.clone()), CancellationToken::new())
            .unwrap();

    // Once a byte of the answer has drained, the loop is on the answer's epoch.
    let answer = Epoch::new(1);
    assert!(engine.reset(answer));
    assert_eq!(
        engine.append(Bytes::from_static(b"w"), answer).await,
        AppendOutcome::Accepted
    );
    assert_eq!(next_notice(&mut notices).await, PlaybackNotice::Drained(answer));

    // The device now holds every chunk, so the loop waits on the first one.
    factory.set_hold(true);
    assert_eq!(
        engine.append(Bytes::from_static(b"AAAABBBBCCCC"), answer).await,
        AppendOutcome::Accepted
    );
    let deadline = Instant::now() + Duration::from_secs(5);
    while factory.played().len() < 5 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let stops_before = factory.stops();

    factory.set_hold(false);
    assert!(engine.reset(Epoch::new(2)));
    let deadline = Instant::now() + Duration::from_secs(5);
    while factory.stops() == stops_before && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    engine.shutdown().unwrap();
    assert_eq!(factory.played(), b"wAAAA");
    assert!(factory.stops() > stops_before);
}

#[test]
fn reset_is_idempotent_and_monotonic() {
    let buffer = PlaybackBuffer::with_epoch(32, Epoch::new(1));
    assert_eq!(buffer.append(b"AB", Epoch::new(1)), AppendOutcome::Accepted);

    assert!(buffer.reset(Epoch::new(2)));
    assert!(!buffer.reset(Epoch::new(2)));
    assert!(!buffer.reset(Epoch::new(1)));

    assert!(buffer.is_empty());
    assert_eq!(buffer.current_epoch(), Epoch::new(2));
    assert_eq!(buffer.append(b"C", Epoch::new(1)), AppendOutcome::Stale);
    assert_eq!(buffer.drain_chunk(16), None);
}

#[test]
fn buffer_never_exceeds_capacity_under_concurrent_appends() {
    let buffer = Arc::new(PlaybackBuffer::new(100));
    let producers: Vec<_> = (0..4_u8)
        .map(|id| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut accepted = 0_usize;
                for _ in 0..50 {
                    if buffer.append(&[id; 7], Epoch::ZERO).is_accepted() {
                        accepted += 7;
                    }
                    assert!(buffer.len() <= 100);
                }
                accepted
            })
        })
        .collect();

    let mut drained = 0;
    for _ in 0..200 {
        if let Some(chunk) = buffer.drain_chunk(5) {
            drained += chunk.bytes.len();
        }
        assert!(buffer.len() <= 100);
    }

    let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
    assert_eq!(accepted, drained + buffer.len());
}

#[tokio::test]
async fn shutdown_drains_what_fits_in_grace() {
    // 10 bytes per write at 5 ms each: 100 bytes take about 50 ms, well
    // inside a 1 s grace.
    let factory = RecordingFactory::with_delay(Duration::from_millis(5));
    let shutdown = CancellationToken::new();
    let (engine, _notices) =
        PlaybackEngine::spawn(&settings(1_024, 10), Box::new(factory.clone()), shutdown.clone())
            .unwrap();

    assert_eq!(
        engine.append(Bytes::from(vec![9; 100]), Epoch::ZERO).await,
        AppendOutcome::Accepted
    );
    shutdown.cancel();

    let report = engine.shutdown().unwrap();
    assert_eq!(factory.played().len(), 100);
    assert_eq!(report.bytes_written, 100);
    assert_eq!(report.bytes_abandoned, 0);
}

#[tokio::test]
async fn shutdown_gives_up_after_grace() {
    // 10 bytes per 20 ms against a 60 ms grace: roughly 30 of 1000 bytes.
    let factory = RecordingFactory::with_delay(Duration::from_millis(20));
    let mut config = settings(4_096, 10);
    config.shutdown_grace_ms = 60;
    let (engine, _notices) =
        PlaybackEngine::spawn(&config, Box::new(factory.clone()), CancellationToken::new())
            .unwrap();

    assert_eq!(
        engine.append(Bytes::from(vec![1; 1_000]), Epoch::ZERO).await,
        AppendOutcome::Accepted
    );

    let started = Instant::now();
    let report = engine.shutdown().unwrap();
    let elapsed = started.elapsed();

    // Grace plus one in-flight write, with slack for a loaded machine.
    assert!(elapsed < Duration::from_millis(500), "shutdown took {elapsed:?}");
    assert!(report.bytes_written >= 10);
    assert!(report.bytes_abandoned > 0);
    assert_eq!(
        report.bytes_written + report.bytes_abandoned,
        1_000,
        "every byte is either written or abandoned"
    );
}
