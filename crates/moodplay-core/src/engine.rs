//! Moodplay engine: the transport state machine.
//!
//! Owns one `PlaybackSession` holding at most one active backend, the
//! current mood playlist and the shared volume controller. Every transport
//! operation runs on the caller's thread; only a streaming backend has a
//! worker, and it is always torn down before the next backend opens.
//!
//! The engine is not `Send`: a clip line may own a device stream that must
//! stay on the thread that opened it. Volume changes from other threads go
//! through `volume_handle()`.

use std::sync::Arc;

use crate::backend::{ActiveBackend, BufferedClip, StreamSettings, StreamingPlayer};
use crate::config::EngineConfig;
use crate::error::{PlaybackError, Result};
use crate::models::{PlaybackCommand, PlaybackEvent, PlaybackSnapshot, PlaybackState, Track, TrackKind};
use crate::output::AudioDevice;
use crate::playlist::{Playlist, PlaylistManager};
use crate::progress::PositionSource;
use crate::volume::VolumeController;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Transport state plus the backend it applies to.
#[derive(Default)]
pub struct PlaybackSession {
    state: PlaybackState,
    backend: Option<ActiveBackend>,
    /// Last track that opened successfully. Survives `stop` so a UI can
    /// keep showing it.
    track: Option<Track>,
}

impl PlaybackSession {
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn backend(&self) -> Option<&ActiveBackend> {
        self.backend.as_ref()
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PlaybackEngine {
    device: Arc<dyn AudioDevice>,
    playlists: PlaylistManager,
    playlist: Option<Playlist>,
    session: PlaybackSession,
    volume: Arc<VolumeController>,
    settings: StreamSettings,
}

impl PlaybackEngine {
    /// Engine on the default cpal output device.
    #[cfg(feature = "native")]
    pub fn native(config: &EngineConfig) -> Self {
        Self::new(config, Arc::new(crate::output::CpalDevice::new()))
    }

    /// Engine on any device. Use `NullDevice` for headless runs.
    pub fn new(config: &EngineConfig, device: Arc<dyn AudioDevice>) -> Self {
        Self {
            device,
            playlists: PlaylistManager::new(config.music_root.clone()),
            playlist: None,
            session: PlaybackSession::default(),
            volume: Arc::new(VolumeController::new(config.initial_volume, config.volume_exponent)),
            settings: config.stream_settings(),
        }
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Tear down whatever is playing, open `track` and start it from 0.
    /// On failure the engine is left stopped with no current track.
    pub fn play(&mut self, track: &Track) -> Result<()> {
        self.teardown();
        self.session.track = None;

        let opened = match track.kind() {
            TrackKind::Buffered => BufferedClip::open(track, self.device.as_ref()).map(ActiveBackend::Buffered),
            TrackKind::Streamed => {
                StreamingPlayer::open(track, Arc::clone(&self.device), self.settings).map(ActiveBackend::Streaming)
            }
        };
        let backend = opened.map_err(|e| {
            log::error!("moodplay: cannot play '{}': {}", track.display_name(), e);
            e
        })?;

        self.volume.attach(backend.gain_control());
        backend.start();
        self.session.backend = Some(backend);
        self.session.track = Some(track.clone());
        self.session.state = PlaybackState::Playing;
        log::info!("moodplay: playing '{}' ({})", track.display_name(), track.kind().as_str());
        Ok(())
    }

    /// Playing → Paused. False (and nothing changes) from any other state.
    pub fn pause(&mut self) -> bool {
        if self.session.state != PlaybackState::Playing {
            return false;
        }
        if let Some(backend) = &self.session.backend {
            backend.pause();
        }
        self.session.state = PlaybackState::Paused;
        true
    }

    /// Paused → Playing. False (and nothing changes) from any other state.
    pub fn resume(&mut self) -> bool {
        if self.session.state != PlaybackState::Paused {
            return false;
        }
        if let Some(backend) = &self.session.backend {
            backend.start();
        }
        self.session.state = PlaybackState::Playing;
        true
    }

    /// Pause when playing, resume when paused. False when stopped.
    pub fn toggle_pause(&mut self) -> bool {
        match self.session.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Stopped => false,
        }
    }

    pub fn stop(&mut self) {
        if self.session.backend.is_some() {
            log::info!("moodplay: stop");
        }
        self.teardown();
    }

    /// Move to `target_micros`, clamped to the track length. No-op while
    /// stopped or when the length is unknown. Keeps Playing/Paused.
    pub fn seek(&mut self, target_micros: u64) -> Result<()> {
        if self.session.state == PlaybackState::Stopped {
            return Ok(());
        }
        let playing = self.session.state == PlaybackState::Playing;
        let Some(backend) = self.session.backend.as_mut() else {
            return Ok(());
        };
        let Some(total) = backend.total_micros() else {
            log::debug!("moodplay: seek ignored, length unknown");
            return Ok(());
        };
        let target = target_micros.min(total);

        let reopened = match backend {
            ActiveBackend::Buffered(clip) => {
                clip.set_position_micros(target);
                if playing {
                    clip.start();
                }
                None
            }
            ActiveBackend::Streaming(player) => Some(player.seek(target).map(|()| player.gain_control())),
        };

        match reopened {
            Some(Ok(gain)) => self.volume.attach(gain),
            Some(Err(e)) => {
                log::error!("moodplay: seek failed: {}", e);
                self.teardown();
                return Err(e);
            }
            None => {}
        }
        Ok(())
    }

    /// Set the 0-100 volume level. Never changes transport state.
    pub fn set_volume(&self, level: u8) {
        self.volume.set_level(level);
    }

    /// Shared volume controller, usable from any thread.
    pub fn volume_handle(&self) -> Arc<VolumeController> {
        Arc::clone(&self.volume)
    }

    // -----------------------------------------------------------------------
    // Playlist navigation
    // -----------------------------------------------------------------------

    /// Load a mood and make it current. Playback stops once it loaded.
    pub fn load_mood(&mut self, mood: &str) -> Result<&Playlist> {
        let playlist = self.playlists.load_mood(mood)?;
        self.stop();
        let playlist: &Playlist = self.playlist.insert(playlist);
        Ok(playlist)
    }

    pub fn play_next(&mut self) -> Result<()> {
        let track = self.playlist_mut()?.next().cloned().ok_or(PlaybackError::NoPlaylist)?;
        self.play(&track)
    }

    pub fn play_previous(&mut self) -> Result<()> {
        let track = self.playlist_mut()?.previous().cloned().ok_or(PlaybackError::NoPlaylist)?;
        self.play(&track)
    }

    pub fn play_index(&mut self, index: usize) -> Result<()> {
        let track = self.playlist_mut()?.select(index)?.clone();
        self.play(&track)
    }

    fn playlist_mut(&mut self) -> Result<&mut Playlist> {
        self.playlist.as_mut().ok_or(PlaybackError::NoPlaylist)
    }

    // -----------------------------------------------------------------------
    // Events and commands
    // -----------------------------------------------------------------------

    /// Report a finished or failed backend. Either one stops the engine.
    pub fn poll(&mut self) -> Option<PlaybackEvent> {
        let backend = self.session.backend.as_ref()?;
        let event = if let Some(err) = backend.take_error() {
            PlaybackEvent::Failed(err)
        } else if backend.is_finished() {
            PlaybackEvent::Finished(backend.track().clone())
        } else {
            return None;
        };
        match &event {
            PlaybackEvent::Finished(track) => log::info!("moodplay: finished '{}'", track.display_name()),
            PlaybackEvent::Failed(err) => log::error!("moodplay: playback failed: {}", err),
        }
        self.teardown();
        Some(event)
    }

    pub fn apply(&mut self, cmd: PlaybackCommand) -> Result<()> {
        match cmd {
            PlaybackCommand::LoadMood { mood } => {
                self.load_mood(&mood)?;
            }
            PlaybackCommand::Play { index } => self.play_index(index)?,
            PlaybackCommand::Pause => {
                self.pause();
            }
            PlaybackCommand::Resume => {
                self.resume();
            }
            PlaybackCommand::TogglePause => {
                self.toggle_pause();
            }
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::Seek { position_ms } => self.seek(position_ms.saturating_mul(1000))?,
            PlaybackCommand::Next => self.play_next()?,
            PlaybackCommand::Previous => self.play_previous()?,
            PlaybackCommand::SetVolume { level } => self.set_volume(level),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Readable state
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// 0 while stopped.
    pub fn position_micros(&self) -> u64 {
        match (&self.session.state, &self.session.backend) {
            (PlaybackState::Stopped, _) | (_, None) => 0,
            (_, Some(backend)) => backend.position_micros(),
        }
    }

    pub fn total_micros(&self) -> Option<u64> {
        self.session.backend.as_ref().and_then(|b| b.total_micros())
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.session.track.as_ref()
    }

    pub fn playlist(&self) -> Option<&Playlist> {
        self.playlist.as_ref()
    }

    pub fn playlists(&self) -> &PlaylistManager {
        &self.playlists
    }

    pub fn volume(&self) -> u8 {
        self.volume.level()
    }

    /// Native value of the active line's gain control.
    pub fn gain(&self) -> Option<f32> {
        self.volume.gain()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state(),
            mood: self.playlist.as_ref().map(|p| p.mood().to_string()),
            track: self.current_track().map(|t| t.display_name().to_string()),
            track_index: self.playlist.as_ref().and_then(|p| p.current_index()),
            position_micros: self.position_micros(),
            total_micros: self.total_micros(),
            volume: self.volume(),
        }
    }

    /// Close the backend, drop the gain control, go Stopped.
    fn teardown(&mut self) {
        if let Some(mut backend) = self.session.backend.take() {
            backend.close();
        }
        self.volume.detach();
        self.session.state = PlaybackState::Stopped;
    }
}

impl PositionSource for PlaybackEngine {
    fn state(&self) -> PlaybackState {
        self.session.state
    }

    fn position_micros(&self) -> u64 {
        PlaybackEngine::position_micros(self)
    }

    fn total_micros(&self) -> Option<u64> {
        PlaybackEngine::total_micros(self)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
