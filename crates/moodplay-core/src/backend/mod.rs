//! Playback backends.
//!
//! `BufferedClip` plays fully decoded audio through a clip line.
//! `StreamingPlayer` decodes on a worker and writes PCM to a line.
//! The engine holds at most one of them as an `ActiveBackend`.

use std::sync::Arc;

use crate::error::PlaybackError;
use crate::models::Track;
use crate::output::GainControl;

pub mod clip;
pub mod decode;
pub mod stream;

pub use clip::BufferedClip;
pub use stream::{StreamSettings, StreamingPlayer};

/// The one open backend of a playback session.
pub enum ActiveBackend {
    Buffered(BufferedClip),
    Streaming(StreamingPlayer),
}

impl ActiveBackend {
    pub fn track(&self) -> &Track {
        match self {
            Self::Buffered(clip) => clip.track(),
            Self::Streaming(player) => player.track(),
        }
    }

    pub fn start(&self) {
        match self {
            Self::Buffered(clip) => clip.start(),
            Self::Streaming(player) => player.start(),
        }
    }

    pub fn pause(&self) {
        match self {
            Self::Buffered(clip) => clip.stop(),
            Self::Streaming(player) => player.pause(),
        }
    }

    pub fn position_micros(&self) -> u64 {
        match self {
            Self::Buffered(clip) => clip.position_micros(),
            Self::Streaming(player) => player.position_micros(),
        }
    }

    pub fn total_micros(&self) -> Option<u64> {
        match self {
            Self::Buffered(clip) => Some(clip.total_micros()),
            Self::Streaming(player) => player.total_micros(),
        }
    }

    pub fn gain_control(&self) -> Option<Arc<GainControl>> {
        match self {
            Self::Buffered(clip) => clip.gain_control(),
            Self::Streaming(player) => player.gain_control(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Self::Buffered(clip) => clip.is_finished(),
            Self::Streaming(player) => player.is_finished(),
        }
    }

    /// A failure the backend hit after opening. Clips cannot fail late.
    pub fn take_error(&self) -> Option<PlaybackError> {
        match self {
            Self::Buffered(_) => None,
            Self::Streaming(player) => player.take_error(),
        }
    }

    /// Release everything: the clip line, or the worker and its line.
    pub fn close(&mut self) {
        match self {
            Self::Buffered(clip) => clip.close(),
            Self::Streaming(player) => player.shutdown(),
        }
    }
}
