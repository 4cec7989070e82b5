//! Output devices and the lines backends open on them.
//!
//! A clip line plays an in-memory buffer and owns its own playback clock.
//! A PCM line accepts 16-bit PCM writes from the streaming worker and blocks
//! the writer on back-pressure. Both report an optional master gain control.
//!
//! The engine abstracts over native (cpal) and headless devices with the
//! `AudioDevice` trait.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::Result;

pub mod convert;
#[cfg(feature = "native")]
pub mod native;
pub mod null;

#[cfg(feature = "native")]
pub use native::CpalDevice;
pub use null::NullDevice;

// ---------------------------------------------------------------------------
// Formats and buffers
// ---------------------------------------------------------------------------

/// Signed 16-bit little-endian interleaved PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }

    pub fn frame_bytes(&self) -> usize {
        self.channels.max(1) as usize * Self::BYTES_PER_SAMPLE
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.frame_bytes() as u64
    }

    /// Playback time of `bytes` of PCM in this format.
    pub fn bytes_to_micros(&self, bytes: u64) -> u64 {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return 0;
        }
        (bytes as u128 * 1_000_000 / bps as u128) as u64
    }
}

/// Fully decoded audio, interleaved `f32`.
#[derive(Debug, Clone)]
pub struct ClipBuffer {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl ClipBuffer {
    pub fn frames(&self) -> u64 {
        (self.samples.len() / self.channels.max(1) as usize) as u64
    }

    pub fn duration_micros(&self) -> u64 {
        frames_to_micros(self.frames(), self.sample_rate)
    }
}

pub fn frames_to_micros(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames as u128 * 1_000_000 / sample_rate as u128) as u64
}

pub fn micros_to_frames(micros: u64, sample_rate: u32) -> u64 {
    (micros as u128 * sample_rate as u128 / 1_000_000) as u64
}

// ---------------------------------------------------------------------------
// Gain
// ---------------------------------------------------------------------------

/// Master gain in decibels, the same range a typical mixer line reports.
pub const MASTER_GAIN_MIN_DB: f32 = -80.0;
pub const MASTER_GAIN_MAX_DB: f32 = 6.0206;

/// A line's native gain control. Value is stored as f32 bits so the audio
/// callback can read it without locking.
#[derive(Debug)]
pub struct GainControl {
    min: f32,
    max: f32,
    value: AtomicU32,
}

impl GainControl {
    /// New control starting at 0 dB (clamped into range).
    pub fn new(min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            value: AtomicU32::new(0.0f32.clamp(min, max).to_bits()),
        }
    }

    pub fn master() -> Self {
        Self::new(MASTER_GAIN_MIN_DB, MASTER_GAIN_MAX_DB)
    }

    pub fn minimum(&self) -> f32 {
        self.min
    }

    pub fn maximum(&self) -> f32 {
        self.max
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::SeqCst))
    }

    pub fn set_value(&self, db: f32) {
        let db = if db.is_nan() { self.min } else { db.clamp(self.min, self.max) };
        self.value.store(db.to_bits(), Ordering::SeqCst);
    }

    /// Sample multiplier for the current value. The floor of the range mutes.
    pub fn linear_factor(&self) -> f32 {
        let db = self.value();
        if db <= self.min {
            0.0
        } else {
            10.0f32.powf(db / 20.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Line control shared between the worker and the control thread
// ---------------------------------------------------------------------------

/// Run/abort flags of a PCM line plus the wakeup used by blocked writers.
///
/// The line itself lives on the streaming worker; the control thread keeps
/// this handle to pause output and to unblock a writer during teardown.
#[derive(Debug)]
pub struct LineControl {
    running: AtomicBool,
    aborted: AtomicBool,
    gain: Option<Arc<GainControl>>,
    lock: Mutex<()>,
    wake: Condvar,
}

impl LineControl {
    pub fn new(gain: Option<Arc<GainControl>>) -> Self {
        Self {
            running: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            gain,
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Makes any pending or future write return immediately.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn gain_control(&self) -> Option<Arc<GainControl>> {
        self.gain.clone()
    }

    /// Sleep until notified or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) {
        let mut guard = self.lock.lock();
        if self.is_aborted() {
            return;
        }
        self.wake.wait_for(&mut guard, timeout);
    }

    pub fn notify(&self) {
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Lines and devices
// ---------------------------------------------------------------------------

/// An opened in-memory clip. Position is in frames and set directly.
pub trait ClipLine {
    fn start(&self);
    fn stop(&self);
    fn is_running(&self) -> bool;
    fn frame_position(&self) -> u64;
    fn set_frame_position(&self, frame: u64);
    fn frame_length(&self) -> u64;
    fn sample_rate(&self) -> u32;
    /// True once playback ran into the end of the buffer.
    fn is_finished(&self) -> bool;
    fn gain_control(&self) -> Option<Arc<GainControl>>;
    /// Release the output. Idempotent.
    fn close(&mut self);
}

/// An opened PCM output fed by writes.
pub trait PcmLine {
    fn format(&self) -> PcmFormat;
    fn control(&self) -> Arc<LineControl>;
    /// Queue PCM for output, blocking while the line is stopped or full.
    /// Returns the bytes accepted; fewer than `pcm.len()` only after abort.
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;
    /// Block until queued audio has played, bounded by the line's buffer.
    fn drain(&mut self);
    /// Release the output. Idempotent.
    fn close(&mut self);
}

/// Something that can open clip and PCM lines.
pub trait AudioDevice: Send + Sync {
    /// The (sample rate, channels) a clip decoded at the given format should
    /// be converted to before `open_clip`.
    fn clip_format(&self, sample_rate: u32, channels: u16) -> (u32, u16);
    fn open_clip(&self, clip: ClipBuffer) -> Result<Box<dyn ClipLine>>;
    /// Called on the streaming worker; the line never leaves that thread.
    fn open_line(&self, format: PcmFormat) -> Result<Box<dyn PcmLine>>;
}
