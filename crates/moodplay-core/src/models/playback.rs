//! Transport state, commands, events and snapshots.
//!
//! PlaybackCommand is a tagged enum so an embedding UI can drive the engine
//! with JSON messages. PlaybackSnapshot is what it renders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PlaybackError;
use crate::models::track::Track;

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Command accepted by `PlaybackEngine::apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlaybackCommand {
    LoadMood { mood: String },
    Play { index: usize },
    Pause,
    Resume,
    TogglePause,
    Stop,
    Seek { position_ms: u64 },
    Next,
    Previous,
    SetVolume { level: u8 },
}

impl PlaybackCommand {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(v: &Value) -> Option<Self> {
        serde_json::from_value(v.clone()).ok()
    }
}

/// Something that happened on the playback side since the last poll.
#[derive(Debug)]
pub enum PlaybackEvent {
    /// The track played to its end; the engine is now stopped.
    Finished(Track),
    /// Decoding or output failed mid-track; the engine is now stopped.
    Failed(PlaybackError),
}

/// Read-only view of the engine for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub mood: Option<String>,
    pub track: Option<String>,
    pub track_index: Option<usize>,
    pub position_micros: u64,
    pub total_micros: Option<u64>,
    pub volume: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_json_shape() {
        let cmd = PlaybackCommand::Seek { position_ms: 1500 };
        let v = cmd.to_value();
        assert_eq!(v["action"], "seek");
        assert_eq!(v["position_ms"], 1500);
        assert_eq!(PlaybackCommand::from_value(&v), Some(cmd));
    }

    #[test]
    fn command_from_ui_message() {
        let v = serde_json::json!({"action": "load_mood", "mood": "chill"});
        assert_eq!(
            PlaybackCommand::from_value(&v),
            Some(PlaybackCommand::LoadMood { mood: "chill".into() })
        );
        let v = serde_json::json!({"action": "toggle_pause"});
        assert_eq!(PlaybackCommand::from_value(&v), Some(PlaybackCommand::TogglePause));
        assert!(PlaybackCommand::from_value(&serde_json::json!({"action": "noop"})).is_none());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(PlaybackState::Paused).unwrap(), "paused");
        assert_eq!(PlaybackState::default(), PlaybackState::Stopped);
    }
}
