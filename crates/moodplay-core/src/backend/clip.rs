//! Fully decoded playback.
//!
//! The whole file is decoded up front and handed to a clip line, so seeking
//! is an O(1) cursor move exact to one frame. No worker thread: the clip's
//! clock belongs to the output device.

use std::sync::Arc;

use crate::backend::decode;
use crate::error::Result;
use crate::models::Track;
use crate::output::convert::conform_clip;
use crate::output::{frames_to_micros, micros_to_frames, AudioDevice, ClipLine, GainControl};

pub struct BufferedClip {
    track: Track,
    line: Box<dyn ClipLine>,
    closed: bool,
}

impl BufferedClip {
    /// Decode `track` and open a clip line for it. Output is not started.
    pub fn open(track: &Track, device: &dyn AudioDevice) -> Result<Self> {
        let decoded = decode::decode_clip(track.path())?;
        let (rate, channels) = device.clip_format(decoded.sample_rate, decoded.channels);
        let clip = conform_clip(decoded, rate, channels);
        let line = device.open_clip(clip)?;
        log::info!(
            "moodplay: opened clip '{}' ({} ms)",
            track.display_name(),
            frames_to_micros(line.frame_length(), line.sample_rate()) / 1000
        );
        Ok(Self {
            track: track.clone(),
            line,
            closed: false,
        })
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn start(&self) {
        self.line.start();
    }

    pub fn stop(&self) {
        self.line.stop();
    }

    pub fn is_running(&self) -> bool {
        self.line.is_running()
    }

    pub fn is_finished(&self) -> bool {
        self.line.is_finished()
    }

    pub fn position_micros(&self) -> u64 {
        frames_to_micros(self.line.frame_position(), self.line.sample_rate())
    }

    /// Move the cursor. Clamped to the clip length.
    pub fn set_position_micros(&self, micros: u64) {
        let frame = micros_to_frames(micros, self.line.sample_rate()).min(self.line.frame_length());
        self.line.set_frame_position(frame);
    }

    pub fn total_micros(&self) -> u64 {
        frames_to_micros(self.line.frame_length(), self.line.sample_rate())
    }

    pub fn gain_control(&self) -> Option<Arc<GainControl>> {
        self.line.gain_control()
    }

    /// Release the line. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.line.stop();
        self.line.close();
        log::debug!("moodplay: closed clip '{}'", self.track.display_name());
    }
}

impl Drop for BufferedClip {
    fn drop(&mut self) {
        self.close();
    }
}
