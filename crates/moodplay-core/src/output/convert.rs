//! Sample conversion between decoded audio and a device's native format.
//!
//! Linear interpolation resampling and channel up/down-mix. Good enough for
//! playback, zero extra deps.

use std::sync::Arc;

use crate::output::ClipBuffer;

/// Stateful linear resampler over interleaved frames.
///
/// Keeps its phase across calls so chunked input from the streaming worker
/// resamples without seams.
pub struct LinearResampler {
    ratio: f64,
    phase: f64,
    channels: usize,
    last_frame: Vec<f32>,
}

impl LinearResampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            ratio: dst_rate.max(1) as f64 / src_rate.max(1) as f64,
            phase: 0.0,
            channels,
            last_frame: Vec::new(),
        }
    }

    pub fn is_needed(&self) -> bool {
        (self.ratio - 1.0).abs() > 0.001
    }

    /// Resample one block of interleaved samples.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if !self.is_needed() {
            return input.to_vec();
        }
        let ch = self.channels;
        // Prepend the previous block's final frame so interpolation across
        // the block boundary has a left neighbour.
        let mut frames: Vec<f32> = Vec::with_capacity(self.last_frame.len() + input.len());
        frames.extend_from_slice(&self.last_frame);
        frames.extend_from_slice(&input[..input.len() - input.len() % ch]);

        let in_frames = frames.len() / ch;
        if in_frames < 2 {
            self.last_frame = frames;
            return Vec::new();
        }

        let step = 1.0 / self.ratio;
        let mut output = Vec::with_capacity(((in_frames as f64) * self.ratio).ceil() as usize * ch);
        while self.phase + 1.0 < in_frames as f64 {
            let idx = self.phase as usize;
            let frac = (self.phase - idx as f64) as f32;
            for c in 0..ch {
                let s0 = frames[idx * ch + c];
                let s1 = frames[(idx + 1) * ch + c];
                output.push(s0 + (s1 - s0) * frac);
            }
            self.phase += step;
        }

        // Carry the last frame; phase becomes relative to it.
        self.phase -= (in_frames - 1) as f64;
        self.last_frame = frames[(in_frames - 1) * ch..].to_vec();
        output
    }
}

/// Adapt interleaved samples between channel counts.
///
/// Mono is duplicated to every output channel, multi-channel to mono is
/// averaged, otherwise matching channels are copied and extras zero-filled.
pub fn adapt_channels(src: &[f32], src_ch: u16, dst_ch: u16) -> Vec<f32> {
    let src_ch = src_ch.max(1) as usize;
    let dst_ch = dst_ch.max(1) as usize;
    if src_ch == dst_ch {
        return src.to_vec();
    }
    let frames = src.len() / src_ch;
    let mut dst = vec![0.0f32; frames * dst_ch];

    for (frame, out) in src.chunks_exact(src_ch).zip(dst.chunks_exact_mut(dst_ch)) {
        if src_ch == 1 {
            out.fill(frame[0]);
        } else if dst_ch == 1 {
            out[0] = frame.iter().sum::<f32>() / src_ch as f32;
        } else {
            let n = src_ch.min(dst_ch);
            out[..n].copy_from_slice(&frame[..n]);
        }
    }
    dst
}

/// Signed 16-bit little-endian PCM to `f32` in [-1, 1).
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}

/// Convert a decoded clip to the given rate and channel count.
pub fn conform_clip(clip: ClipBuffer, sample_rate: u32, channels: u16) -> ClipBuffer {
    if clip.sample_rate == sample_rate && clip.channels == channels {
        return clip;
    }
    let mixed = adapt_channels(&clip.samples, clip.channels, channels);
    let mut resampler = LinearResampler::new(clip.sample_rate, sample_rate, channels);
    let samples = if resampler.is_needed() {
        resampler.process(&mixed)
    } else {
        mixed
    };
    log::info!(
        "moodplay: converted clip {}Hz/{}ch -> {}Hz/{}ch",
        clip.sample_rate,
        clip.channels,
        sample_rate,
        channels
    );
    ClipBuffer {
        samples: Arc::from(samples),
        sample_rate,
        channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resampler_same_rate_passthrough() {
        let mut rs = LinearResampler::new(44_100, 44_100, 2);
        assert!(!rs.is_needed());
        let input = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(rs.process(&input), input);
    }

    #[test]
    fn resampler_doubles_frame_count_on_upsample() {
        let mut rs = LinearResampler::new(22_050, 44_100, 1);
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = rs.process(&input);
        // One frame is held back for the next block.
        assert!((out.len() as i64 - 198).abs() <= 2, "got {}", out.len());
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn resampler_is_seamless_across_blocks() {
        let input: Vec<f32> = (0..200).map(|i| i as f32).collect();
        let mut whole = LinearResampler::new(48_000, 44_100, 1);
        let expected = whole.process(&input);

        let mut chunked = LinearResampler::new(48_000, 44_100, 1);
        let mut got = chunked.process(&input[..77]);
        got.extend(chunked.process(&input[77..]));
        assert_eq!(got.len(), expected.len());
        for (a, b) in got.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn adapt_mono_to_stereo() {
        assert_eq!(adapt_channels(&[1.0, 2.0, 3.0], 1, 2), vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn adapt_stereo_to_mono_averages() {
        assert_eq!(adapt_channels(&[1.0, 3.0, 2.0, 4.0], 2, 1), vec![2.0, 3.0]);
    }

    #[test]
    fn adapt_stereo_to_quad_zero_fills() {
        assert_eq!(adapt_channels(&[0.5, -0.5], 2, 4), vec![0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn pcm16_scales_to_unit_range() {
        let bytes = [0x00, 0x80, 0xff, 0x7f, 0x00, 0x00];
        let out = pcm16_to_f32(&bytes);
        assert_eq!(out[0], -1.0);
        assert!((out[1] - 0.99997).abs() < 1e-4);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn conform_clip_converts_layout() {
        let clip = ClipBuffer {
            samples: Arc::from(vec![0.25f32; 1000]),
            sample_rate: 22_050,
            channels: 1,
        };
        let out = conform_clip(clip, 44_100, 2);
        assert_eq!(out.channels, 2);
        assert_eq!(out.sample_rate, 44_100);
        assert!(out.frames() >= 1990 && out.frames() <= 2000);
        assert!(out.samples.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }
}
