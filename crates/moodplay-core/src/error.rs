//! Error types for playback and playlist operations.

use std::path::PathBuf;

use thiserror::Error;

/// Everything the engine can surface to its caller.
///
/// Recoverable local conditions (seek with unknown duration, missing gain
/// control, pause while not playing) never become errors; they are no-ops.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Mood folder does not exist.
    #[error("mood folder not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Mood folder exists but holds no supported audio files.
    #[error("no audio files found for mood: {0}")]
    Empty(String),

    /// Track selection outside the playlist.
    #[error("track index {index} out of range (playlist has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Track navigation requested before any mood was loaded.
    #[error("no playlist loaded")]
    NoPlaylist,

    /// Decoder cannot open the selected file.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Output device is busy or cannot be obtained.
    #[error("output line unavailable: {0}")]
    LineUnavailable(String),

    /// Decode failure after the file was opened.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
