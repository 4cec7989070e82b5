//! Headless output device.
//!
//! Plays nothing but keeps time like real hardware: clips advance with the
//! wall clock while started, and PCM writes take as long as the audio they
//! carry. Counts open lines so callers can check that teardown released
//! everything.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{PlaybackError, Result};
use crate::output::{
    frames_to_micros, AudioDevice, ClipBuffer, ClipLine, GainControl, LineControl, PcmFormat,
    PcmLine,
};

/// How long a stopped line's writer sleeps between flag checks.
const STOPPED_POLL: Duration = Duration::from_millis(10);

/// Headless `AudioDevice`.
#[derive(Debug, Clone)]
pub struct NullDevice {
    gain_range: Option<(f32, f32)>,
    available: bool,
    open_lines: Arc<AtomicUsize>,
}

impl NullDevice {
    /// Available device whose lines carry a master gain control.
    pub fn new() -> Self {
        Self {
            gain_range: Some((super::MASTER_GAIN_MIN_DB, super::MASTER_GAIN_MAX_DB)),
            available: true,
            open_lines: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Lines report this gain range instead of the master default.
    pub fn with_gain_range(mut self, min: f32, max: f32) -> Self {
        self.gain_range = Some((min, max));
        self
    }

    /// Lines expose no gain control at all.
    pub fn without_gain_control(mut self) -> Self {
        self.gain_range = None;
        self
    }

    /// Every open fails as if the device were busy.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Clip and PCM lines currently open on this device (shared by clones).
    pub fn open_lines(&self) -> usize {
        self.open_lines.load(Ordering::SeqCst)
    }

    fn gain(&self) -> Option<Arc<GainControl>> {
        self.gain_range.map(|(min, max)| Arc::new(GainControl::new(min, max)))
    }

    fn check_available(&self) -> Result<OpenGuard> {
        if !self.available {
            return Err(PlaybackError::LineUnavailable("null device marked unavailable".into()));
        }
        Ok(OpenGuard::new(Arc::clone(&self.open_lines)))
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for NullDevice {
    fn clip_format(&self, sample_rate: u32, channels: u16) -> (u32, u16) {
        (sample_rate, channels)
    }

    fn open_clip(&self, clip: ClipBuffer) -> Result<Box<dyn ClipLine>> {
        let guard = self.check_available()?;
        Ok(Box::new(NullClip {
            frames: clip.frames(),
            sample_rate: clip.sample_rate,
            clock: Mutex::new(ClipClock {
                anchor: 0,
                started: None,
            }),
            gain: self.gain(),
            guard,
        }))
    }

    fn open_line(&self, format: PcmFormat) -> Result<Box<dyn PcmLine>> {
        let guard = self.check_available()?;
        Ok(Box::new(NullLine {
            format,
            control: Arc::new(LineControl::new(self.gain())),
            guard,
        }))
    }
}

// ---------------------------------------------------------------------------
// Open-line accounting
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct OpenGuard {
    counter: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl OpenGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
            closed: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

struct ClipClock {
    /// Frame position when the clock was last anchored.
    anchor: u64,
    /// Set while running.
    started: Option<Instant>,
}

struct NullClip {
    frames: u64,
    sample_rate: u32,
    clock: Mutex<ClipClock>,
    gain: Option<Arc<GainControl>>,
    guard: OpenGuard,
}

impl NullClip {
    fn position_of(&self, clock: &ClipClock) -> u64 {
        let elapsed = clock
            .started
            .map(|t| (t.elapsed().as_micros() * self.sample_rate as u128 / 1_000_000) as u64)
            .unwrap_or(0);
        (clock.anchor + elapsed).min(self.frames)
    }
}

impl ClipLine for NullClip {
    fn start(&self) {
        let mut clock = self.clock.lock();
        if clock.started.is_none() {
            clock.started = Some(Instant::now());
        }
    }

    fn stop(&self) {
        let mut clock = self.clock.lock();
        clock.anchor = self.position_of(&clock);
        clock.started = None;
    }

    fn is_running(&self) -> bool {
        let clock = self.clock.lock();
        clock.started.is_some() && self.position_of(&clock) < self.frames
    }

    fn frame_position(&self) -> u64 {
        let clock = self.clock.lock();
        self.position_of(&clock)
    }

    fn set_frame_position(&self, frame: u64) {
        let mut clock = self.clock.lock();
        clock.anchor = frame.min(self.frames);
        if clock.started.is_some() {
            clock.started = Some(Instant::now());
        }
    }

    fn frame_length(&self) -> u64 {
        self.frames
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_finished(&self) -> bool {
        let clock = self.clock.lock();
        clock.started.is_some() && self.position_of(&clock) >= self.frames
    }

    fn gain_control(&self) -> Option<Arc<GainControl>> {
        self.gain.clone()
    }

    fn close(&mut self) {
        self.clock.lock().started = None;
        self.guard.release();
    }
}

// ---------------------------------------------------------------------------
// PCM line
// ---------------------------------------------------------------------------

struct NullLine {
    format: PcmFormat,
    control: Arc<LineControl>,
    guard: OpenGuard,
}

impl PcmLine for NullLine {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn control(&self) -> Arc<LineControl> {
        Arc::clone(&self.control)
    }

    /// Consumes `pcm` at the line's rate. Time spent stopped doesn't count.
    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let mut remaining = Duration::from_micros(frames_to_micros(
            (pcm.len() / self.format.frame_bytes()) as u64,
            self.format.sample_rate,
        ));
        loop {
            if self.control.is_aborted() {
                return Ok(0);
            }
            if !self.control.is_running() {
                self.control.wait(STOPPED_POLL);
                continue;
            }
            if remaining.is_zero() {
                return Ok(pcm.len());
            }
            let slice = Instant::now();
            self.control.wait(remaining.min(STOPPED_POLL));
            remaining = remaining.saturating_sub(slice.elapsed());
        }
    }

    fn drain(&mut self) {}

    fn close(&mut self) {
        self.control.stop();
        self.guard.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(frames: usize, rate: u32) -> ClipBuffer {
        ClipBuffer {
            samples: Arc::from(vec![0.0f32; frames]),
            sample_rate: rate,
            channels: 1,
        }
    }

    #[test]
    fn clip_clock_advances_only_while_started() {
        let device = NullDevice::new();
        let line = device.open_clip(clip(48_000, 48_000)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(line.frame_position(), 0);

        line.start();
        std::thread::sleep(Duration::from_millis(50));
        line.stop();
        let frozen = line.frame_position();
        assert!(frozen >= 2_400, "clock did not advance: {}", frozen);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(line.frame_position(), frozen);
    }

    #[test]
    fn clip_set_position_is_exact() {
        let device = NullDevice::new();
        let line = device.open_clip(clip(48_000, 48_000)).unwrap();
        line.set_frame_position(12_345);
        assert_eq!(line.frame_position(), 12_345);
        line.set_frame_position(1_000_000);
        assert_eq!(line.frame_position(), 48_000);
    }

    #[test]
    fn clip_finishes_at_end() {
        let device = NullDevice::new();
        let line = device.open_clip(clip(480, 48_000)).unwrap();
        line.start();
        std::thread::sleep(Duration::from_millis(30));
        assert!(line.is_finished());
        assert!(!line.is_running());
    }

    #[test]
    fn open_lines_are_counted_and_released_once() {
        let device = NullDevice::new();
        let mut a = device.open_clip(clip(10, 8_000)).unwrap();
        let b = device.open_line(PcmFormat::new(8_000, 1)).unwrap();
        assert_eq!(device.open_lines(), 2);
        a.close();
        a.close();
        assert_eq!(device.open_lines(), 1);
        drop(b);
        assert_eq!(device.open_lines(), 0);
    }

    #[test]
    fn write_takes_real_time_and_abort_unblocks() {
        let device = NullDevice::new();
        let mut line = device.open_line(PcmFormat::new(8_000, 1)).unwrap();
        let control = line.control();
        control.start();

        let start = Instant::now();
        assert_eq!(line.write(&[0u8; 800]).unwrap(), 800); // 50 ms
        assert!(start.elapsed() >= Duration::from_millis(45));

        control.stop();
        let aborter = {
            let control = Arc::clone(&control);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                control.abort();
            })
        };
        assert_eq!(line.write(&[0u8; 800]).unwrap(), 0);
        aborter.join().unwrap();
    }

    #[test]
    fn unavailable_device_refuses_lines() {
        let device = NullDevice::unavailable();
        assert!(matches!(
            device.open_line(PcmFormat::new(8_000, 1)),
            Err(PlaybackError::LineUnavailable(_))
        ));
        assert!(device.open_clip(clip(10, 8_000)).is_err());
        assert_eq!(device.open_lines(), 0);
    }

    #[test]
    fn gain_control_presence_follows_builder() {
        let device = NullDevice::new().without_gain_control();
        let line = device.open_line(PcmFormat::new(8_000, 1)).unwrap();
        assert!(line.control().gain_control().is_none());

        let device = NullDevice::new().with_gain_range(-10.0, 2.0);
        let clip = device.open_clip(clip(10, 8_000)).unwrap();
        let g = clip.gain_control().unwrap();
        assert_eq!((g.minimum(), g.maximum()), (-10.0, 2.0));
    }
}
