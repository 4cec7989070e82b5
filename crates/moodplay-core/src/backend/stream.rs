//! Incremental decode-and-output on a dedicated worker.
//!
//! One `moodplay-stream` thread per launch. It opens the decoder and the PCM
//! line itself (cpal streams cannot cross threads), reports the result over
//! a handshake channel, then loops: read a chunk, wait at the pause gate,
//! write. Position is the preset start plus bytes written over the format's
//! byte rate, so it lags real output by at most one chunk.
//!
//! Seeking tears the worker down and launches a new one reading from the
//! target. Teardown is bounded: stop flag, abort the line, wake the gate,
//! then wait on the exit channel for `teardown_timeout`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

use crate::backend::decode::{self, PcmReader, SourceInfo};
use crate::error::{PlaybackError, Result};
use crate::models::Track;
use crate::output::{AudioDevice, GainControl, LineControl, PcmLine};

const WORKER_NAME: &str = "moodplay-stream";

/// Worker tuning, normally taken from `EngineConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Decoded PCM bytes per loop iteration. Rounded down to whole frames.
    pub chunk_bytes: usize,
    /// Longest a paused worker sleeps before rechecking its flags.
    pub pause_poll: Duration,
    /// How long teardown waits for the worker to exit.
    pub teardown_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_bytes: 4096,
            pause_poll: Duration::from_millis(50),
            teardown_timeout: Duration::from_millis(500),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared worker state
// ---------------------------------------------------------------------------

/// Flags and slots shared by the control thread and one worker.
#[derive(Debug)]
struct WorkerSignals {
    stop: AtomicBool,
    paused: AtomicBool,
    finished: AtomicBool,
    position_micros: AtomicU64,
    error: Mutex<Option<PlaybackError>>,
    gate: Mutex<()>,
    wake: Condvar,
}

impl WorkerSignals {
    fn new(start_micros: u64, paused: bool) -> Self {
        Self {
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(paused),
            finished: AtomicBool::new(false),
            position_micros: AtomicU64::new(start_micros),
            error: Mutex::new(None),
            gate: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Block while paused. False when stop was requested.
    fn wait_while_paused(&self, poll: Duration) -> bool {
        let mut guard = self.gate.lock();
        while self.paused.load(Ordering::SeqCst) {
            if self.stop_requested() {
                return false;
            }
            self.wake.wait_for(&mut guard, poll);
        }
        !self.stop_requested()
    }

    fn notify(&self) {
        let _guard = self.gate.lock();
        self.wake.notify_all();
    }

    fn fail(&self, err: PlaybackError) {
        log::error!("moodplay: streaming worker failed: {}", err);
        *self.error.lock() = Some(err);
    }
}

/// A running worker as seen from the control thread.
struct Worker {
    signals: Arc<WorkerSignals>,
    control: Arc<LineControl>,
    handle: Option<JoinHandle<()>>,
    exit_rx: Receiver<()>,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

pub struct StreamingPlayer {
    track: Track,
    device: Arc<dyn AudioDevice>,
    settings: StreamSettings,
    info: SourceInfo,
    worker: Option<Worker>,
}

impl StreamingPlayer {
    /// Inspect `track` and launch a worker at position 0. Output stays
    /// stopped until `start`.
    pub fn open(track: &Track, device: Arc<dyn AudioDevice>, settings: StreamSettings) -> Result<Self> {
        let info = decode::inspect(track.path())?;
        log::info!(
            "moodplay: opened stream '{}' ({}Hz/{}ch, {} bytes, duration {:?} us)",
            track.display_name(),
            info.format.sample_rate,
            info.format.channels,
            info.total_bytes,
            info.total_micros
        );
        let mut player = Self {
            track: track.clone(),
            device,
            settings,
            info,
            worker: None,
        };
        player.worker = Some(player.launch(0, true)?);
        Ok(player)
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn total_micros(&self) -> Option<u64> {
        self.info.total_micros
    }

    pub fn position_micros(&self) -> u64 {
        self.worker
            .as_ref()
            .map(|w| w.signals.position_micros.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Start (or restart) output from the current position.
    pub fn start(&self) {
        if let Some(w) = &self.worker {
            w.signals.paused.store(false, Ordering::SeqCst);
            w.control.start();
            w.signals.notify();
        }
    }

    /// Suspend output. The worker keeps its decoder and line.
    pub fn pause(&self) {
        if let Some(w) = &self.worker {
            w.signals.paused.store(true, Ordering::SeqCst);
            w.control.stop();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| w.signals.paused.load(Ordering::SeqCst))
            .unwrap_or(true)
    }

    /// True once the worker played the stream to its end.
    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| w.signals.finished.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// A failure recorded by the worker, taken at most once.
    pub fn take_error(&self) -> Option<PlaybackError> {
        self.worker.as_ref().and_then(|w| w.signals.error.lock().take())
    }

    pub fn gain_control(&self) -> Option<Arc<GainControl>> {
        self.worker.as_ref().and_then(|w| w.control.gain_control())
    }

    /// Rebuild the pipeline at `target_micros`, keeping the pause state.
    /// On failure no worker remains.
    pub fn seek(&mut self, target_micros: u64) -> Result<()> {
        let paused = self.is_paused();
        let target = match self.info.total_micros {
            Some(total) => target_micros.min(total),
            None => target_micros,
        };
        self.shutdown();
        log::info!(
            "moodplay: seek '{}' to {} ms{}",
            self.track.display_name(),
            target / 1000,
            if paused { " (paused)" } else { "" }
        );
        let worker = self.launch(target, paused)?;
        if !paused {
            worker.control.start();
        }
        self.worker = Some(worker);
        Ok(())
    }

    /// Tear the worker down. Returns once it exited or the timeout passed.
    pub fn shutdown(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        worker.signals.stop.store(true, Ordering::SeqCst);
        worker.control.abort();
        worker.signals.notify();

        match worker.exit_rx.recv_timeout(self.settings.teardown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = worker.handle.take() {
                    if handle.join().is_err() {
                        log::error!("moodplay: streaming worker panicked");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "moodplay: streaming worker for '{}' did not exit within {:?}; detaching it (resource leak)",
                    self.track.display_name(),
                    self.settings.teardown_timeout
                );
            }
        }
    }

    fn launch(&self, start_micros: u64, paused: bool) -> Result<Worker> {
        let signals = Arc::new(WorkerSignals::new(start_micros, paused));
        let (ready_tx, ready_rx) = bounded::<Result<Arc<LineControl>>>(1);
        let (exit_tx, exit_rx) = bounded::<()>(1);

        let job = StreamJob {
            path: self.track.path().to_path_buf(),
            info: self.info.clone(),
            start_micros,
            settings: self.settings,
            device: Arc::clone(&self.device),
            signals: Arc::clone(&signals),
        };
        let worker_signals = Arc::clone(&signals);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || {
                // A panicking decoder or line must still surface through poll().
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.run(ready_tx))) {
                    worker_signals.fail(PlaybackError::Decode(format!(
                        "streaming worker panicked: {}",
                        panic_message(payload.as_ref())
                    )));
                }
                let _ = exit_tx.send(());
            })?;

        match ready_rx.recv() {
            Ok(Ok(control)) => Ok(Worker {
                signals,
                control,
                handle: Some(handle),
                exit_rx,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(signals
                    .error
                    .lock()
                    .take()
                    .unwrap_or_else(|| PlaybackError::Decode("streaming worker exited during open".into())))
            }
        }
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl Drop for StreamingPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

struct StreamJob {
    path: PathBuf,
    info: SourceInfo,
    start_micros: u64,
    settings: StreamSettings,
    device: Arc<dyn AudioDevice>,
    signals: Arc<WorkerSignals>,
}

/// How the run loop ended.
enum Exit {
    Exhausted,
    Stopped,
}

impl StreamJob {
    fn run(self, ready: Sender<Result<Arc<LineControl>>>) {
        let opened = PcmReader::open_at(&self.path, &self.info, self.start_micros)
            .and_then(|reader| Ok((reader, self.device.open_line(self.info.format)?)));
        let (mut reader, mut line) = match opened {
            Ok(pair) => pair,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        if ready.send(Ok(line.control())).is_err() {
            line.close();
            return;
        }

        match self.pump(&mut reader, line.as_mut()) {
            Ok(Exit::Exhausted) => {
                line.drain();
                line.close();
                self.signals.finished.store(true, Ordering::SeqCst);
                log::info!("moodplay: stream reached end of '{}'", self.path.display());
            }
            Ok(Exit::Stopped) => {
                line.close();
                log::debug!("moodplay: stream worker stopped");
            }
            Err(e) => {
                line.close();
                self.signals.fail(e);
            }
        }
        drop(reader);
    }

    fn pump(&self, reader: &mut PcmReader, line: &mut dyn PcmLine) -> Result<Exit> {
        let format = self.info.format;
        let frame = format.frame_bytes();
        let chunk = (self.settings.chunk_bytes - self.settings.chunk_bytes % frame).max(frame);
        let mut buf = vec![0u8; chunk];
        let mut written: u64 = 0;

        loop {
            if self.signals.stop_requested() {
                return Ok(Exit::Stopped);
            }
            let n = reader.read(&mut buf)?;
            if n == 0 {
                return Ok(Exit::Exhausted);
            }
            if !self.signals.wait_while_paused(self.settings.pause_poll) {
                return Ok(Exit::Stopped);
            }
            let accepted = line.write(&buf[..n])?;
            if accepted < n {
                return Ok(Exit::Stopped);
            }
            written += accepted as u64;
            self.signals
                .position_micros
                .store(self.start_micros + format.bytes_to_micros(written), Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackKind;
    use crate::output::NullDevice;
    use crate::test_support::{write_wav, Fault, FaultyDevice};
    use std::time::Instant;
    use tempfile::TempDir;

    fn streamed(dir: &TempDir, name: &str, frames: u32) -> Track {
        let path = dir.path().join(name);
        write_wav(&path, 8_000, 1, frames);
        Track::new(path, TrackKind::Streamed)
    }

    fn setup(frames: u32) -> (TempDir, NullDevice, StreamingPlayer) {
        let dir = TempDir::new().unwrap();
        let track = streamed(&dir, "b.mp3", frames);
        let device = NullDevice::new();
        let player = StreamingPlayer::open(&track, Arc::new(device.clone()), StreamSettings::default()).unwrap();
        (dir, device, player)
    }

    #[test]
    fn worker_is_named_and_position_advances() {
        let (_dir, _device, player) = setup(80_000);
        assert_eq!(player.position_micros(), 0);
        assert_eq!(
            player.worker.as_ref().unwrap().handle.as_ref().unwrap().thread().name(),
            Some(WORKER_NAME)
        );
        player.start();
        // 4096-byte chunks of 8 kHz mono are 256 ms each.
        std::thread::sleep(Duration::from_millis(400));
        let pos = player.position_micros();
        assert!(pos >= 256_000 && pos <= 768_000, "pos {}", pos);
    }

    #[test]
    fn paused_position_is_frozen() {
        let (_dir, _device, player) = setup(80_000);
        player.start();
        std::thread::sleep(Duration::from_millis(200));
        player.pause();
        let at_pause = player.position_micros();
        std::thread::sleep(Duration::from_millis(200));
        let later = player.position_micros();
        assert!(later.abs_diff(at_pause) <= 260_000, "{} vs {}", at_pause, later);
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(player.position_micros(), later);
    }

    #[test]
    fn paused_seek_presets_position_exactly() {
        let (_dir, device, mut player) = setup(80_000);
        player.seek(4_000_000).unwrap();
        assert_eq!(player.position_micros(), 4_000_000);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(player.position_micros(), 4_000_000);
        assert_eq!(device.open_lines(), 1);
    }

    #[test]
    fn shutdown_releases_line_within_timeout() {
        let (_dir, device, mut player) = setup(80_000);
        player.start();
        std::thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        player.shutdown();
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(device.open_lines(), 0);
        assert_eq!(player.position_micros(), 0);
    }

    #[test]
    fn short_stream_finishes() {
        let (_dir, device, player) = setup(800);
        player.start();
        let deadline = Instant::now() + Duration::from_secs(3);
        while !player.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(player.is_finished());
        assert!(player.take_error().is_none());
        assert_eq!(device.open_lines(), 0);
    }

    #[test]
    fn unavailable_device_fails_open() {
        let dir = TempDir::new().unwrap();
        let track = streamed(&dir, "b.mp3", 8_000);
        let err = StreamingPlayer::open(&track, Arc::new(NullDevice::unavailable()), StreamSettings::default()).err();
        assert!(matches!(err, Some(PlaybackError::LineUnavailable(_))));
    }

    fn wait_for_error(player: &StreamingPlayer) -> Option<PlaybackError> {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if let Some(err) = player.take_error() {
                return Some(err);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    #[test]
    fn write_error_lands_in_error_slot() {
        let dir = TempDir::new().unwrap();
        let track = streamed(&dir, "b.mp3", 80_000);
        let device = NullDevice::new();
        let faulty = FaultyDevice::new(device.clone(), Fault::Error, 2);
        let player = StreamingPlayer::open(&track, Arc::new(faulty), StreamSettings::default()).unwrap();
        player.start();

        assert!(matches!(wait_for_error(&player), Some(PlaybackError::Decode(_))));
        assert!(!player.is_finished());
        assert_eq!(device.open_lines(), 0);
    }

    #[test]
    fn worker_panic_is_caught_and_reported() {
        let dir = TempDir::new().unwrap();
        let track = streamed(&dir, "b.mp3", 80_000);
        let device = NullDevice::new();
        let faulty = FaultyDevice::new(device.clone(), Fault::Panic, 2);
        let mut player = StreamingPlayer::open(&track, Arc::new(faulty), StreamSettings::default()).unwrap();
        player.start();

        match wait_for_error(&player) {
            Some(PlaybackError::Decode(msg)) => assert!(msg.contains("blew up"), "{}", msg),
            other => panic!("expected Decode, got {:?}", other),
        }
        player.shutdown();
        assert_eq!(device.open_lines(), 0);
    }

    #[test]
    fn panic_during_open_fails_open_with_decode() {
        let dir = TempDir::new().unwrap();
        let track = streamed(&dir, "b.mp3", 8_000);
        let faulty = FaultyDevice::new(NullDevice::new(), Fault::PanicOnOpen, 0);
        let err = StreamingPlayer::open(&track, Arc::new(faulty), StreamSettings::default()).err();
        assert!(matches!(err, Some(PlaybackError::Decode(_))), "{:?}", err);
    }
}
