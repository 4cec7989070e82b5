//! Track classification.
//!
//! The kind of a track is decided once, from its file extension, and picks
//! the backend that will play it. No content sniffing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extensions played from a fully decoded in-memory clip.
pub const BUFFERED_EXTENSIONS: &[&str] = &["wav"];

/// Extensions decoded incrementally by the streaming worker.
pub const STREAMED_EXTENSIONS: &[&str] = &["mp3", "flac"];

/// Which backend a track needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Buffered,
    Streamed,
}

impl TrackKind {
    /// Classify a bare extension (no dot), case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if BUFFERED_EXTENSIONS.contains(&ext.as_str()) {
            Some(TrackKind::Buffered)
        } else if STREAMED_EXTENSIONS.contains(&ext.as_str()) {
            Some(TrackKind::Streamed)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Buffered => "buffered",
            TrackKind::Streamed => "streamed",
        }
    }
}

/// One playable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    path: PathBuf,
    display_name: String,
    kind: TrackKind,
}

impl Track {
    /// Build a track with an explicit kind.
    pub fn new(path: impl Into<PathBuf>, kind: TrackKind) -> Self {
        let path = path.into();
        let display_name = display_name(&path);
        Self { path, display_name, kind }
    }

    /// Build a track from a path, classifying by extension.
    /// Returns `None` for unsupported extensions.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(TrackKind::from_extension)?;
        Some(Self::new(path, kind))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }
}

/// File name without its extension. A leading-dot name keeps its full text.
fn display_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension_ignores_case() {
        assert_eq!(TrackKind::from_extension("WAV"), Some(TrackKind::Buffered));
        assert_eq!(TrackKind::from_extension("Mp3"), Some(TrackKind::Streamed));
        assert_eq!(TrackKind::from_extension("flac"), Some(TrackKind::Streamed));
        assert_eq!(TrackKind::from_extension("txt"), None);
    }

    #[test]
    fn display_name_strips_extension() {
        let t = Track::from_path("/music/chill/Night Drive.MP3").unwrap();
        assert_eq!(t.display_name(), "Night Drive");
        assert_eq!(t.kind(), TrackKind::Streamed);

        let t = Track::new("/music/chill/a.b.wav", TrackKind::Buffered);
        assert_eq!(t.display_name(), "a.b");

        let t = Track::new("/music/chill/.wav", TrackKind::Buffered);
        assert_eq!(t.display_name(), ".wav");
    }

    #[test]
    fn unsupported_path_is_rejected() {
        assert!(Track::from_path("/music/chill/cover.jpg").is_none());
        assert!(Track::from_path("/music/chill/noext").is_none());
    }
}
