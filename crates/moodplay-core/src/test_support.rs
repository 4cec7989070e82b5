//! Fixtures for tests: synthesized audio files and a device that misbehaves
//! on demand.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::error::{PlaybackError, Result};
use crate::output::{AudioDevice, ClipBuffer, ClipLine, LineControl, NullDevice, PcmFormat, PcmLine};

/// Write a 16-bit sine at 440 Hz with `frames` frames.
pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let s = ((t * 440.0 * std::f32::consts::TAU).sin() * 8_000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(s).expect("write sample");
        }
    }
    writer.finalize().expect("finalize wav");
}

/// MPEG-1 Layer III, 128 kbps, 44.1 kHz, mono, no padding.
const MP3_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC0];
/// 144 * 128000 / 44100, rounded down.
pub(crate) const MP3_FRAME_BYTES: usize = 417;
pub(crate) const MP3_FRAME_SAMPLES: u64 = 1152;
pub(crate) const MP3_SAMPLE_RATE: u32 = 44_100;

/// Write a constant-bitrate MP3 of `frames` silent frames.
pub(crate) fn write_mp3(path: &Path, frames: usize) {
    let mut frame = vec![0u8; MP3_FRAME_BYTES];
    frame[..4].copy_from_slice(&MP3_FRAME_HEADER);
    let mut file = std::fs::File::create(path).expect("create mp3");
    for _ in 0..frames {
        file.write_all(&frame).expect("write mp3 frame");
    }
}

// ---------------------------------------------------------------------------
// Faulty device
// ---------------------------------------------------------------------------

/// What a `FaultyDevice` line does once its healthy writes are used up.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    Error,
    Panic,
    /// Panic inside `open_line` itself.
    PanicOnOpen,
}

/// A `NullDevice` whose PCM lines fail after `healthy_writes` writes.
#[derive(Debug, Clone)]
pub(crate) struct FaultyDevice {
    inner: NullDevice,
    fault: Fault,
    healthy_writes: usize,
}

impl FaultyDevice {
    pub(crate) fn new(inner: NullDevice, fault: Fault, healthy_writes: usize) -> Self {
        Self {
            inner,
            fault,
            healthy_writes,
        }
    }
}

impl AudioDevice for FaultyDevice {
    fn clip_format(&self, sample_rate: u32, channels: u16) -> (u32, u16) {
        self.inner.clip_format(sample_rate, channels)
    }

    fn open_clip(&self, clip: ClipBuffer) -> Result<Box<dyn ClipLine>> {
        self.inner.open_clip(clip)
    }

    fn open_line(&self, format: PcmFormat) -> Result<Box<dyn PcmLine>> {
        if let Fault::PanicOnOpen = self.fault {
            panic!("device blew up while opening a line");
        }
        Ok(Box::new(FaultyLine {
            inner: self.inner.open_line(format)?,
            fault: self.fault,
            remaining: self.healthy_writes,
        }))
    }
}

struct FaultyLine {
    inner: Box<dyn PcmLine>,
    fault: Fault,
    remaining: usize,
}

impl PcmLine for FaultyLine {
    fn format(&self) -> PcmFormat {
        self.inner.format()
    }

    fn control(&self) -> Arc<LineControl> {
        self.inner.control()
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        if self.remaining == 0 {
            match self.fault {
                Fault::Error => return Err(PlaybackError::Decode("line rejected the write".into())),
                Fault::Panic | Fault::PanicOnOpen => panic!("line blew up mid-write"),
            }
        }
        self.remaining -= 1;
        self.inner.write(pcm)
    }

    fn drain(&mut self) {
        self.inner.drain();
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
