//! Transport-command relay
//!
//! Routes playback commands (play, pause, skip, volume, play-song) with the
//! single-writer invariant: only the user's active device drives playback.
//! A missing or stale active-device pointer makes every command a silent
//! no-op; it is never an error to the caller.

use uuid::Uuid;

use unison_protocol::PlaybackState;

use super::connection::ConnectionManager;
use super::store::PlaybackStore;

/// A playback command carried over the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    Next,
    Previous,
    SetVolume { volume: u8 },
    PlaySong { song_id: String, start_time_secs: f64 },
}

impl TransportCommand {
    /// The resulting logical state, or None for pure-relay commands
    ///
    /// `Next`/`Previous` carry no state here: queue advancement needs the
    /// client-held playlist context, so the active device performs it and
    /// publishes the outcome as a full snapshot.
    fn apply_to(&self, mut state: PlaybackState) -> Option<PlaybackState> {
        match self {
            TransportCommand::Play => {
                state.is_playing = true;
                Some(state)
            }
            TransportCommand::Pause => {
                state.is_playing = false;
                Some(state)
            }
            TransportCommand::SetVolume { volume } => {
                state.volume = (*volume).min(100);
                Some(state)
            }
            TransportCommand::PlaySong {
                song_id,
                start_time_secs,
            } => {
                state.current_song_id = Some(song_id.clone());
                state.position_secs = start_time_secs.max(0.0);
                state.is_playing = true;
                Some(state)
            }
            TransportCommand::Next | TransportCommand::Previous => None,
        }
    }
}

/// Relays transport commands for a single connection
pub struct CommandRelay {
    user_id: Uuid,
    connection_id: Uuid,
    manager: ConnectionManager,
    store: PlaybackStore,
}

impl CommandRelay {
    pub fn new(
        user_id: Uuid,
        connection_id: Uuid,
        manager: ConnectionManager,
        store: PlaybackStore,
    ) -> Self {
        Self {
            user_id,
            connection_id,
            manager,
            store,
        }
    }

    /// Route a transport command
    ///
    /// Accepted commands land in the playback-state store so reconnecting
    /// devices observe the latest intent; the originating connection never
    /// receives its own command back.
    pub async fn dispatch(&self, command: TransportCommand) {
        let Some(active_id) = self.manager.active_device(self.user_id) else {
            tracing::debug!(
                user_id = %self.user_id,
                ?command,
                "No active device, command dropped"
            );
            return;
        };

        let Some(active_connection) = self
            .manager
            .connection_of_device(self.user_id, &active_id)
        else {
            // Stale pointer: the named device is gone. Same as no active device.
            tracing::debug!(
                user_id = %self.user_id,
                active_device_id = %active_id,
                ?command,
                "Active device not registered, command dropped"
            );
            return;
        };

        if active_connection != self.connection_id {
            // Only the active device's own connection drives playback
            tracing::debug!(
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                active_device_id = %active_id,
                ?command,
                "Command from non-active device dropped"
            );
            return;
        }

        if let Some(next) = command.apply_to(self.store.get_state(self.user_id).await) {
            let stored = self.store.set_state(self.user_id, next).await;
            tracing::debug!(
                user_id = %self.user_id,
                device_id = %active_id,
                last_updated = stored.last_updated,
                ?command,
                "Command applied to playback state"
            );
        }
        // The origin is the active device itself and the fan-out primitive
        // never echoes to the origin, so there is no live push to deliver.
    }
}
