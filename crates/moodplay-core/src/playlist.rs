//! Mood playlists.
//!
//! A mood is a folder under the music root. Loading a mood scans that folder
//! (non-recursive) for supported extensions and yields an ordered playlist
//! with wraparound navigation.

use std::path::{Path, PathBuf};

use crate::error::{PlaybackError, Result};
use crate::models::Track;
use crate::paths;

/// Resolves mood names to playlists under one music root.
#[derive(Debug, Clone)]
pub struct PlaylistManager {
    root: PathBuf,
}

impl PlaylistManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan `<root>/<mood>` for playable files, sorted by file name.
    pub fn load_mood(&self, mood: &str) -> Result<Playlist> {
        let Some(dir) = paths::mood_dir(&self.root, mood) else {
            log::warn!("moodplay: rejected mood name '{}'", mood);
            return Err(PlaybackError::NotFound(self.root.join(mood)));
        };
        if !dir.is_dir() {
            return Err(PlaybackError::NotFound(dir));
        }

        let mut tracks: Vec<Track> = std::fs::read_dir(&dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(Track::from_path)
            .collect();

        if tracks.is_empty() {
            return Err(PlaybackError::Empty(mood.to_string()));
        }

        tracks.sort_by(|a, b| a.path().file_name().cmp(&b.path().file_name()));
        log::info!("moodplay: loaded mood '{}' ({} tracks)", mood, tracks.len());
        Ok(Playlist::new(mood, tracks))
    }

    /// Mood folders present under the root, sorted. Missing root → empty.
    pub fn moods(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut moods: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect();
        moods.sort();
        moods
    }
}

/// Ordered tracks for one mood plus the current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    mood: String,
    tracks: Vec<Track>,
    current: Option<usize>,
}

impl Playlist {
    /// A playlist with nothing selected.
    pub fn new(mood: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            mood: mood.into(),
            tracks,
            current: None,
        }
    }

    pub fn mood(&self) -> &str {
        &self.mood
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Advance with wraparound. From no selection, picks the first track.
    pub fn next(&mut self) -> Option<&Track> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let index = match self.current {
            Some(i) => (i + 1) % len,
            None => 0,
        };
        self.current = Some(index);
        self.tracks.get(index)
    }

    /// Step back with wraparound. From no selection, picks the last track.
    pub fn previous(&mut self) -> Option<&Track> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let index = match self.current {
            Some(i) => (i + len - 1) % len,
            None => len - 1,
        };
        self.current = Some(index);
        self.tracks.get(index)
    }

    /// Select by index. The current selection is untouched on error.
    pub fn select(&mut self, index: usize) -> Result<&Track> {
        if index >= self.tracks.len() {
            return Err(PlaybackError::IndexOutOfRange {
                index,
                len: self.tracks.len(),
            });
        }
        self.current = Some(index);
        Ok(&self.tracks[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackKind;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    fn three() -> Playlist {
        Playlist::new(
            "chill",
            vec![
                Track::new("a.wav", TrackKind::Buffered),
                Track::new("b.mp3", TrackKind::Streamed),
                Track::new("c.wav", TrackKind::Buffered),
            ],
        )
    }

    #[test]
    fn load_mood_filters_and_sorts() {
        let root = TempDir::new().unwrap();
        let chill = root.path().join("chill");
        std::fs::create_dir(&chill).unwrap();
        touch(&chill, "c.wav");
        touch(&chill, "a.WAV");
        touch(&chill, "b.mp3");
        touch(&chill, "notes.txt");
        touch(&chill, "cover.jpg");
        std::fs::create_dir(chill.join("nested.mp3")).unwrap();

        let pl = PlaylistManager::new(root.path()).load_mood("chill").unwrap();
        let names: Vec<_> = pl.tracks().iter().map(|t| t.display_name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(pl.tracks()[0].kind(), TrackKind::Buffered);
        assert_eq!(pl.tracks()[1].kind(), TrackKind::Streamed);
        assert_eq!(pl.current_index(), None);
        assert_eq!(pl.mood(), "chill");
    }

    #[test]
    fn missing_mood_is_not_found() {
        let root = TempDir::new().unwrap();
        let err = PlaylistManager::new(root.path()).load_mood("nonexistent").unwrap_err();
        assert!(matches!(err, PlaybackError::NotFound(_)));
    }

    #[test]
    fn folder_without_audio_is_empty() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("emptyFolder");
        std::fs::create_dir(&dir).unwrap();
        touch(&dir, "readme.txt");
        let err = PlaylistManager::new(root.path()).load_mood("emptyFolder").unwrap_err();
        assert!(matches!(err, PlaybackError::Empty(m) if m == "emptyFolder"));
    }

    #[test]
    fn next_wraps_from_last_to_first() {
        let mut pl = three();
        pl.select(2).unwrap();
        assert_eq!(pl.next().unwrap().display_name(), "a");
        assert_eq!(pl.current_index(), Some(0));
    }

    #[test]
    fn previous_wraps_from_first_to_last() {
        let mut pl = three();
        pl.select(0).unwrap();
        assert_eq!(pl.previous().unwrap().display_name(), "c");
        assert_eq!(pl.current_index(), Some(2));
    }

    #[test]
    fn navigation_from_no_selection() {
        let mut pl = three();
        assert_eq!(pl.next().unwrap().display_name(), "a");

        let mut pl = three();
        assert_eq!(pl.previous().unwrap().display_name(), "c");

        let mut empty = Playlist::new("none", Vec::new());
        assert!(empty.next().is_none());
        assert!(empty.previous().is_none());
    }

    #[test]
    fn select_is_bounds_checked() {
        let mut pl = three();
        pl.select(1).unwrap();
        let err = pl.select(3).unwrap_err();
        assert!(matches!(err, PlaybackError::IndexOutOfRange { index: 3, len: 3 }));
        assert_eq!(pl.current_index(), Some(1));
        assert_eq!(pl.current().unwrap().display_name(), "b");
    }

    #[test]
    fn moods_lists_folders() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("sad")).unwrap();
        std::fs::create_dir(root.path().join("happy")).unwrap();
        touch(root.path(), "stray.wav");
        let mgr = PlaylistManager::new(root.path());
        assert_eq!(mgr.moods(), vec!["happy", "sad"]);
        assert!(PlaylistManager::new(root.path().join("missing")).moods().is_empty());
    }
}
