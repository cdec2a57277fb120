//! Reconciliation between the shared session and the local audio engine

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use unison_protocol::{ClientMessage, Device, PlaybackState, ServerMessage};

use crate::engine::{AudioEngine, EngineEvent};
use crate::error::{ReconcilerError, ReconcilerResult};

/// Default settle window after applying a remote update (milliseconds)
///
/// Engine callbacks fired while the window is open are treated as echoes of
/// the remote update and are not re-published.
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Per-device reconciler
///
/// Owns the local audio engine and the outgoing message channel for one
/// device's connection. Feed every [`ServerMessage`] into
/// [`handle_server_message`](Reconciler::handle_server_message) and every
/// engine callback into [`on_engine_event`](Reconciler::on_engine_event);
/// local user actions go through the `local_*` methods.
pub struct Reconciler<E: AudioEngine> {
    engine: E,
    outgoing: mpsc::UnboundedSender<ClientMessage>,

    /// Server-assigned id for this device, known after registration
    device_id: Option<String>,

    /// The user's active device, as last reported by the server
    active_device_id: Option<String>,

    /// Devices currently registered for this user
    devices: Vec<Device>,

    /// Local mirror of the shared playback state
    state: PlaybackState,

    settle: Duration,
    suppress_until: Option<Instant>,

    /// Catch-up progress after registration
    synced_devices: bool,
    synced_state: bool,
}

impl<E: AudioEngine> Reconciler<E> {
    pub fn new(engine: E, outgoing: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self {
            engine,
            outgoing,
            device_id: None,
            active_device_id: None,
            devices: Vec::new(),
            state: PlaybackState::default(),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            suppress_until: None,
            synced_devices: false,
            synced_state: false,
        }
    }

    /// Override the settle window (tests use a custom duration)
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Request registration of this connection as a playback device
    pub fn register(
        &mut self,
        device_name: &str,
        device_class: unison_protocol::DeviceClass,
    ) -> ReconcilerResult<()> {
        self.send(ClientMessage::RegisterDevice {
            device_name: device_name.to_string(),
            device_class,
        })
    }

    /// Whether this device currently drives audio output
    pub fn is_active(&self) -> bool {
        self.device_id.is_some() && self.device_id == self.active_device_id
    }

    /// Whether the initial catch-up (device list + playback state) completed
    pub fn is_synced(&self) -> bool {
        self.synced_devices && self.synced_state
    }

    /// Local mirror of the shared playback state
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Devices registered for this user, as last reported
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// This device's server-assigned id, if registered
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    // =========================================================================
    // Incoming pushes
    // =========================================================================

    /// Apply a server push to local state and, when active, the engine
    pub fn handle_server_message(&mut self, msg: ServerMessage) -> ReconcilerResult<()> {
        match msg {
            ServerMessage::Connected(payload) => {
                self.active_device_id = payload.active_device_id;
                Ok(())
            }
            ServerMessage::DeviceRegistered { device_id } => {
                tracing::debug!(device_id = %device_id, "device registered");
                self.device_id = Some(device_id);
                self.synced_devices = false;
                self.synced_state = false;
                // Catch up on state established before this device existed
                self.send(ClientMessage::GetConnectedDevices)?;
                self.send(ClientMessage::GetPlaybackState)
            }
            ServerMessage::DeviceList(payload) | ServerMessage::DeviceListUpdated(payload) => {
                self.devices = payload.devices;
                self.active_device_id = payload.active_device_id;
                self.synced_devices = true;
                Ok(())
            }
            ServerMessage::ActiveDeviceChanged { active_device_id } => {
                let was_active = self.is_active();
                self.active_device_id = Some(active_device_id);
                if was_active && !self.is_active() {
                    tracing::debug!("lost active status, stopping local audio");
                    self.engine.stop();
                }
                Ok(())
            }
            ServerMessage::PlaybackStateUpdated(state) => {
                self.apply_remote_state(state);
                self.synced_state = true;
                Ok(())
            }
            ServerMessage::Play => {
                self.state.is_playing = true;
                if self.is_active() {
                    self.begin_suppress();
                    self.engine.play();
                } else {
                    self.engine.pause();
                }
                Ok(())
            }
            ServerMessage::Pause => {
                self.state.is_playing = false;
                if self.is_active() {
                    self.begin_suppress();
                    self.engine.pause();
                }
                Ok(())
            }
            ServerMessage::Next => {
                if self.is_active() {
                    self.begin_suppress();
                    self.advance_next();
                    self.publish_state()?;
                }
                Ok(())
            }
            ServerMessage::Previous => {
                if self.is_active() {
                    self.begin_suppress();
                    self.restart_current();
                    self.publish_state()?;
                }
                Ok(())
            }
            ServerMessage::SetVolume { volume } => {
                self.state.volume = volume.min(100);
                if self.is_active() {
                    self.begin_suppress();
                    self.engine.set_volume(self.state.volume);
                }
                Ok(())
            }
            ServerMessage::PlaySong {
                song_id,
                start_time_secs,
            } => {
                self.state.current_song_id = Some(song_id.clone());
                self.state.position_secs = start_time_secs.max(0.0);
                self.state.is_playing = true;
                if self.is_active() {
                    self.begin_suppress();
                    self.engine.load(&song_id, self.state.position_secs);
                    self.engine.play();
                } else {
                    self.engine.pause();
                }
                Ok(())
            }
            ServerMessage::Pong { .. } => Ok(()),
            ServerMessage::Error(payload) => {
                tracing::warn!(code = %payload.code, message = %payload.message, "server error");
                Ok(())
            }
        }
    }

    /// Apply a full remote snapshot
    fn apply_remote_state(&mut self, state: PlaybackState) {
        let song_changed = state.current_song_id != self.state.current_song_id;
        self.state = state;

        if self.is_active() {
            self.begin_suppress();
            if let Some(song_id) = self.state.current_song_id.clone() {
                if song_changed {
                    self.engine.load(&song_id, self.state.position_secs);
                }
            }
            self.engine.set_volume(self.state.volume);
            if self.state.is_playing {
                self.engine.play();
            } else {
                self.engine.pause();
            }
        } else {
            // UI-visible state only; a non-active device never plays audio
            self.engine.pause();
        }
    }

    // =========================================================================
    // Engine events
    // =========================================================================

    /// React to a callback from the local audio engine
    ///
    /// Events inside the settle window are echoes of a remote update and are
    /// dropped. A non-active or not-yet-synced device never publishes.
    pub fn on_engine_event(&mut self, event: EngineEvent) -> ReconcilerResult<()> {
        if self.suppressed() {
            tracing::trace!(?event, "engine event suppressed during settle window");
            return Ok(());
        }
        if !self.is_active() || !self.is_synced() {
            return Ok(());
        }

        match event {
            EngineEvent::Played => {
                self.state.is_playing = true;
                self.publish_state()
            }
            EngineEvent::Paused => {
                self.state.is_playing = false;
                self.publish_state()
            }
            EngineEvent::TrackEnded => {
                if self.advance_next() {
                    self.engine.play();
                } else {
                    self.state.is_playing = false;
                }
                self.publish_state()
            }
        }
    }

    // =========================================================================
    // Local user actions
    // =========================================================================

    /// Local play action
    pub fn local_play(&mut self) -> ReconcilerResult<()> {
        self.ensure_synced()?;
        if self.is_active() {
            self.engine.play();
            self.state.is_playing = true;
            self.publish_state()
        } else {
            self.send(ClientMessage::Play)
        }
    }

    /// Local pause action
    pub fn local_pause(&mut self) -> ReconcilerResult<()> {
        self.ensure_synced()?;
        if self.is_active() {
            self.engine.pause();
            self.state.is_playing = false;
            self.publish_state()
        } else {
            self.send(ClientMessage::Pause)
        }
    }

    /// Local volume change
    pub fn local_set_volume(&mut self, volume: u8) -> ReconcilerResult<()> {
        self.ensure_synced()?;
        let volume = volume.min(100);
        if self.is_active() {
            self.engine.set_volume(volume);
            self.state.volume = volume;
            self.publish_state()
        } else {
            self.send(ClientMessage::SetVolume { volume })
        }
    }

    /// Local request to play a specific song
    pub fn local_play_song(&mut self, song_id: &str, start_time_secs: f64) -> ReconcilerResult<()> {
        self.ensure_synced()?;
        let start_time_secs = start_time_secs.max(0.0);
        if self.is_active() {
            self.engine.load(song_id, start_time_secs);
            self.engine.play();
            self.state.current_song_id = Some(song_id.to_string());
            self.state.position_secs = start_time_secs;
            self.state.is_playing = true;
            self.publish_state()
        } else {
            self.send(ClientMessage::PlaySong {
                song_id: song_id.to_string(),
                start_time_secs,
            })
        }
    }

    /// Local skip-forward action
    ///
    /// The queue lives client-side, so the advance happens here and the
    /// resulting snapshot is published for the other devices.
    pub fn local_next(&mut self) -> ReconcilerResult<()> {
        self.ensure_synced()?;
        if self.is_active() {
            self.advance_next();
            self.publish_state()
        } else {
            self.send(ClientMessage::Next)
        }
    }

    /// Local skip-back action (restarts the current song)
    pub fn local_previous(&mut self) -> ReconcilerResult<()> {
        self.ensure_synced()?;
        if self.is_active() {
            self.restart_current();
            self.publish_state()
        } else {
            self.send(ClientMessage::Previous)
        }
    }

    /// Replace the local queue and publish the snapshot (active only)
    pub fn local_set_queue(&mut self, song_ids: Vec<String>) -> ReconcilerResult<()> {
        self.ensure_synced()?;
        self.state.queue = song_ids;
        if self.is_active() {
            self.publish_state()
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Move the queue head into the current song; false if the queue is empty
    fn advance_next(&mut self) -> bool {
        if self.state.queue.is_empty() {
            return false;
        }
        let next = self.state.queue.remove(0);
        self.engine.load(&next, 0.0);
        if self.state.is_playing {
            self.engine.play();
        }
        self.state.current_song_id = Some(next);
        self.state.position_secs = 0.0;
        true
    }

    fn restart_current(&mut self) {
        self.state.position_secs = 0.0;
        self.engine.seek(0.0);
    }

    fn publish_state(&mut self) -> ReconcilerResult<()> {
        self.state.last_updated = chrono::Utc::now().timestamp_millis();
        self.send(ClientMessage::SyncPlaybackState(self.state.clone()))
    }

    fn ensure_synced(&self) -> ReconcilerResult<()> {
        if self.is_synced() {
            Ok(())
        } else {
            Err(ReconcilerError::NotSynced)
        }
    }

    fn begin_suppress(&mut self) {
        self.suppress_until = Some(Instant::now() + self.settle);
    }

    fn suppressed(&self) -> bool {
        matches!(self.suppress_until, Some(until) if Instant::now() < until)
    }

    fn send(&self, msg: ClientMessage) -> ReconcilerResult<()> {
        self.outgoing
            .send(msg)
            .map_err(|_| ReconcilerError::Disconnected)
    }
}
