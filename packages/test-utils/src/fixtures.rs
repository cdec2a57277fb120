//! Test fixtures for playback synchronization tests
//!
//! Provides reusable builders for the shared data model.

use unison_protocol::{Device, DeviceClass, PlaybackState};

/// Fluent builder for [`PlaybackState`] snapshots
///
/// Starts from the documented default state (nothing loaded, not playing,
/// position 0, volume 100, empty queue) and overrides from there.
#[derive(Debug, Default)]
pub struct PlaybackStateBuilder {
    state: PlaybackState,
}

impl PlaybackStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current song and mark playback active
    pub fn playing(mut self, song_id: &str) -> Self {
        self.state.current_song_id = Some(song_id.to_string());
        self.state.is_playing = true;
        self
    }

    /// Set the current song without starting playback
    pub fn loaded(mut self, song_id: &str) -> Self {
        self.state.current_song_id = Some(song_id.to_string());
        self
    }

    pub fn position(mut self, position_secs: f64) -> Self {
        self.state.position_secs = position_secs;
        self
    }

    pub fn volume(mut self, volume: u8) -> Self {
        self.state.volume = volume;
        self
    }

    pub fn queue(mut self, song_ids: &[&str]) -> Self {
        self.state.queue = song_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn last_updated(mut self, timestamp_ms: i64) -> Self {
        self.state.last_updated = timestamp_ms;
        self
    }

    pub fn build(self) -> PlaybackState {
        self.state
    }
}

/// Create a registered-device fixture
pub fn device(device_id: &str, name: &str, class: DeviceClass) -> Device {
    Device {
        device_id: device_id.to_string(),
        name: name.to_string(),
        class,
        connected_at: chrono::Utc::now().timestamp_millis(),
    }
}
