//! moodplay-core: mood playlists over a two-backend playback engine.
//!
//! Short files are decoded whole and played from memory; compressed files
//! are decoded on a worker thread and streamed to the output line. Both sit
//! behind one transport API.
//!
//! # Architecture
//!
//! ```text
//! Layer 0: Output devices (cpal, null) and their clip / PCM lines
//! Layer 1: Backends (buffered clip, streaming worker) over symphonia
//! Layer 2: Engine (transport state machine, volume, progress, playlists)
//! Layer 3: Front ends (CLI, any UI) driving the engine and polling state
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod output;
pub mod paths;
pub mod playlist;
pub mod progress;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::EngineConfig;
pub use engine::{PlaybackEngine, PlaybackSession};
pub use error::{PlaybackError, Result};
pub use models::*;
#[cfg(feature = "native")]
pub use output::CpalDevice;
pub use output::{AudioDevice, NullDevice};
pub use playlist::{Playlist, PlaylistManager};
pub use progress::{format_time, PositionSource, Progress, ProgressTracker};
pub use volume::VolumeController;
