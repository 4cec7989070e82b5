//! cpal output: clips and PCM lines on the default output device.
//!
//! Clips are played straight out of their buffer by the stream callback,
//! which advances a frame cursor. PCM lines push converted samples through
//! a ring buffer the callback drains; writes block while the ring is full.
//!
//! cpal streams are not `Send`. Clip streams live on the thread that opened
//! them and PCM line streams live on the streaming worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use crate::error::{PlaybackError, Result};
use crate::output::convert::{adapt_channels, pcm16_to_f32, LinearResampler};
use crate::output::{
    AudioDevice, ClipBuffer, ClipLine, GainControl, LineControl, PcmFormat, PcmLine,
};

/// Ring capacity in milliseconds of output audio.
const RING_MS: u32 = 500;
/// Writer back-off while the ring is full.
const BACKPRESSURE_WAIT: Duration = Duration::from_millis(5);
/// Writer back-off while the line is stopped.
const STOPPED_WAIT: Duration = Duration::from_millis(10);

fn unavailable(e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::LineUnavailable(e.to_string())
}

/// The host's default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevice;

impl CpalDevice {
    pub fn new() -> Self {
        Self
    }

    fn device(&self) -> Result<cpal::Device> {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| unavailable("no output device"))
    }
}

/// Pick a stream config for audio at `rate`/`channels`: use it as-is when the
/// device accepts it in f32, otherwise fall back to the device default.
fn negotiate(device: &cpal::Device, rate: u32, channels: u16) -> Result<cpal::StreamConfig> {
    let channels = channels.max(1);
    let supports = device
        .supported_output_configs()
        .map(|configs| {
            configs.into_iter().any(|range| {
                range.sample_format() == cpal::SampleFormat::F32
                    && range.channels() == channels
                    && range.min_sample_rate().0 <= rate
                    && range.max_sample_rate().0 >= rate
            })
        })
        .unwrap_or(false);

    if supports {
        return Ok(cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(rate),
            buffer_size: cpal::BufferSize::Default,
        });
    }

    let default_cfg = device.default_output_config().map_err(unavailable)?;
    if default_cfg.sample_format() != cpal::SampleFormat::F32 {
        return Err(unavailable(format!(
            "device does not support f32 output (got {:?})",
            default_cfg.sample_format()
        )));
    }
    Ok(default_cfg.into())
}

impl AudioDevice for CpalDevice {
    fn clip_format(&self, sample_rate: u32, channels: u16) -> (u32, u16) {
        self.device()
            .and_then(|d| negotiate(&d, sample_rate, channels))
            .map(|cfg| (cfg.sample_rate.0, cfg.channels))
            .unwrap_or((sample_rate, channels))
    }

    fn open_clip(&self, clip: ClipBuffer) -> Result<Box<dyn ClipLine>> {
        let device = self.device()?;
        let config = cpal::StreamConfig {
            channels: clip.channels.max(1),
            sample_rate: cpal::SampleRate(clip.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(ClipShared {
            frames: clip.frames(),
            channels: clip.channels.max(1) as usize,
            samples: clip.samples,
            cursor: AtomicU64::new(0),
            running: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            gain: Arc::new(GainControl::master()),
        });

        let cb = Arc::clone(&shared);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| cb.render(data),
                move |err| log::error!("moodplay: cpal error: {}", err),
                None,
            )
            .map_err(unavailable)?;
        stream.play().map_err(unavailable)?;

        log::debug!(
            "moodplay: clip line open {}Hz/{}ch, {} frames",
            clip.sample_rate,
            config.channels,
            shared.frames
        );
        Ok(Box::new(CpalClip {
            shared,
            sample_rate: clip.sample_rate,
            stream: Some(stream),
        }))
    }

    fn open_line(&self, format: PcmFormat) -> Result<Box<dyn PcmLine>> {
        let device = self.device()?;
        let config = negotiate(&device, format.sample_rate, format.channels)?;
        let out_channels = config.channels;
        let capacity = (config.sample_rate.0 * RING_MS / 1000) as usize * out_channels as usize;

        let ring = Arc::new(Mutex::new(SampleRing::new(capacity.max(1))));
        let control = Arc::new(LineControl::new(Some(Arc::new(GainControl::master()))));

        let cb_ring = Arc::clone(&ring);
        let cb_control = Arc::clone(&control);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !cb_control.is_running() {
                        data.fill(0.0);
                        return;
                    }
                    cb_ring.lock().pull(data);
                    if let Some(gain) = cb_control.gain_control() {
                        let factor = gain.linear_factor();
                        for s in data.iter_mut() {
                            *s *= factor;
                        }
                    }
                },
                move |err| log::error!("moodplay: cpal error: {}", err),
                None,
            )
            .map_err(unavailable)?;
        stream.play().map_err(unavailable)?;

        if config.sample_rate.0 != format.sample_rate {
            log::info!(
                "moodplay: resampling {}Hz -> {}Hz",
                format.sample_rate,
                config.sample_rate.0
            );
        }
        Ok(Box::new(CpalLine {
            format,
            out_channels,
            out_rate: config.sample_rate.0,
            resampler: LinearResampler::new(format.sample_rate, config.sample_rate.0, out_channels),
            ring,
            control,
            stream: Some(stream),
        }))
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

struct ClipShared {
    samples: Arc<[f32]>,
    frames: u64,
    channels: usize,
    cursor: AtomicU64,
    running: AtomicBool,
    finished: AtomicBool,
    gain: Arc<GainControl>,
}

impl ClipShared {
    fn render(&self, data: &mut [f32]) {
        if !self.running.load(Ordering::SeqCst) {
            data.fill(0.0);
            return;
        }
        let wanted = (data.len() / self.channels) as u64;
        let (start, n) = loop {
            let cur = self.cursor.load(Ordering::SeqCst);
            let n = wanted.min(self.frames.saturating_sub(cur));
            if self
                .cursor
                .compare_exchange(cur, cur + n, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break (cur, n);
            }
        };

        let from = start as usize * self.channels;
        let len = n as usize * self.channels;
        data[..len].copy_from_slice(&self.samples[from..from + len]);
        data[len..].fill(0.0);

        let factor = self.gain.linear_factor();
        for s in data[..len].iter_mut() {
            *s *= factor;
        }

        if start + n >= self.frames {
            self.running.store(false, Ordering::SeqCst);
            self.finished.store(true, Ordering::SeqCst);
        }
    }
}

struct CpalClip {
    shared: Arc<ClipShared>,
    sample_rate: u32,
    stream: Option<cpal::Stream>,
}

impl ClipLine for CpalClip {
    fn start(&self) {
        self.shared.finished.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn frame_position(&self) -> u64 {
        self.shared.cursor.load(Ordering::SeqCst).min(self.shared.frames)
    }

    fn set_frame_position(&self, frame: u64) {
        self.shared.finished.store(false, Ordering::SeqCst);
        self.shared.cursor.store(frame.min(self.shared.frames), Ordering::SeqCst);
    }

    fn frame_length(&self) -> u64 {
        self.shared.frames
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    fn gain_control(&self) -> Option<Arc<GainControl>> {
        Some(Arc::clone(&self.shared.gain))
    }

    fn close(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.stream = None;
    }
}

impl Drop for CpalClip {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// PCM line
// ---------------------------------------------------------------------------

struct CpalLine {
    format: PcmFormat,
    out_channels: u16,
    out_rate: u32,
    resampler: LinearResampler,
    ring: Arc<Mutex<SampleRing>>,
    control: Arc<LineControl>,
    stream: Option<cpal::Stream>,
}

impl PcmLine for CpalLine {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn control(&self) -> Arc<LineControl> {
        Arc::clone(&self.control)
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        if self.control.is_aborted() {
            return Ok(0);
        }
        let whole = pcm.len() - pcm.len() % self.format.frame_bytes();
        let decoded = pcm16_to_f32(&pcm[..whole]);
        let adapted = adapt_channels(&decoded, self.format.channels, self.out_channels);
        let samples = self.resampler.process(&adapted);

        let mut offset = 0;
        while offset < samples.len() {
            if self.control.is_aborted() {
                return Ok(0);
            }
            if !self.control.is_running() {
                self.control.wait(STOPPED_WAIT);
                continue;
            }
            let pushed = self.ring.lock().push(&samples[offset..]);
            offset += pushed;
            if pushed == 0 {
                self.control.wait(BACKPRESSURE_WAIT);
            }
        }
        Ok(pcm.len())
    }

    fn drain(&mut self) {
        let deadline = Instant::now() + Duration::from_millis(RING_MS as u64 + 200);
        while self.control.is_running() && !self.control.is_aborted() && Instant::now() < deadline {
            if self.ring.lock().len() == 0 {
                break;
            }
            self.control.wait(BACKPRESSURE_WAIT);
        }
        log::debug!("moodplay: line drained ({}Hz out)", self.out_rate);
    }

    fn close(&mut self) {
        self.control.stop();
        self.stream = None;
        self.ring.lock().clear();
    }
}

impl Drop for CpalLine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fixed-capacity ring of f32 samples: the writer pushes, the callback pulls.
struct SampleRing {
    buf: Vec<f32>,
    read_pos: usize,
    write_pos: usize,
    len: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity],
            read_pos: 0,
            write_pos: 0,
            len: 0,
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    /// Push as many samples as fit. Returns how many were taken.
    fn push(&mut self, samples: &[f32]) -> usize {
        let n = samples.len().min(self.buf.len() - self.len);
        for &s in &samples[..n] {
            self.buf[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % self.buf.len();
        }
        self.len += n;
        n
    }

    /// Fill `out`, zero-padding on underflow. Returns samples read.
    fn pull(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.len);
        for sample in out.iter_mut().take(n) {
            *sample = self.buf[self.read_pos];
            self.read_pos = (self.read_pos + 1) % self.buf.len();
        }
        self.len -= n;
        out[n..].fill(0.0);
        n
    }

    fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::SampleRing;

    #[test]
    fn push_pull_roundtrip() {
        let mut ring = SampleRing::new(16);
        assert_eq!(ring.push(&[1.0, 2.0, 3.0, 4.0]), 4);
        let mut out = [0.0f32; 4];
        assert_eq!(ring.pull(&mut out), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn push_stops_at_capacity() {
        let mut ring = SampleRing::new(4);
        assert_eq!(ring.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(ring.push(&[4.0, 5.0, 6.0]), 1);
        assert_eq!(ring.len(), 4);
        let mut out = [0.0f32; 6];
        assert_eq!(ring.pull(&mut out), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn wraparound_behavior() {
        let mut ring = SampleRing::new(4);
        ring.push(&[1.0, 2.0, 3.0]);
        let mut out = [0.0f32; 3];
        ring.pull(&mut out);
        ring.push(&[7.0, 8.0, 9.0, 10.0]);
        let mut out2 = [0.0f32; 4];
        ring.pull(&mut out2);
        assert_eq!(out2, [7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn clear_resets() {
        let mut ring = SampleRing::new(8);
        ring.push(&[1.0, 2.0, 3.0]);
        ring.clear();
        let mut out = [1.0f32; 2];
        assert_eq!(ring.pull(&mut out), 0);
        assert_eq!(out, [0.0, 0.0]);
    }
}
