//! Moodplay filesystem and environment conventions.
//!
//! Pure functions mapping moods and settings to paths.

use std::path::{Component, Path, PathBuf};

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Path of a JSON config file to load instead of the default location.
pub const CONFIG_ENV: &str = "MOODPLAY_CONFIG";

/// Overrides `music_root` from whatever config was loaded.
pub const MUSIC_ROOT_ENV: &str = "MOODPLAY_MUSIC_ROOT";

// ---------------------------------------------------------------------------
// Music folders
// ---------------------------------------------------------------------------

/// Music root used when nothing else is configured, relative to the cwd.
pub const DEFAULT_MUSIC_DIR: &str = "music";

/// The moods the player ships buttons for. Each maps to `<root>/<mood>`.
pub const DEFAULT_MOODS: &[&str] = &["happy", "sad", "chill", "energetic", "love", "focus"];

/// `<root>/<mood>`. None unless `mood` is a single plain folder name, so a
/// mood can never resolve outside the root.
pub fn mood_dir(root: &Path, mood: &str) -> Option<PathBuf> {
    let mut components = Path::new(mood).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Some(root.join(name)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// `~/.moodplay/config.json`, or `./.moodplay/config.json` without a HOME.
pub fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".moodplay").join("config.json")
}
