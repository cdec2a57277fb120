//! WebSocket message types for playback synchronization
//!
//! Defines the message protocol for client-server communication over the
//! persistent connection. Messages are serialized as JSON with a
//! `type`/`payload` envelope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{Device, DeviceClass, PlaybackState};

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Register this connection as a playback device
    RegisterDevice {
        device_name: String,
        device_class: DeviceClass,
    },

    /// Point the user's active-device selector at a device
    SelectActiveDevice { device_id: String },

    /// Request the current device list and active pointer
    GetConnectedDevices,

    /// Resume playback on the active device
    Play,

    /// Pause playback on the active device
    Pause,

    /// Skip to the next queue entry (queue advance happens client-side)
    Next,

    /// Skip back (queue advance happens client-side)
    Previous,

    /// Set the active device's volume (0-100)
    SetVolume { volume: u8 },

    /// Start a specific song at a position
    PlaySong {
        song_id: String,
        start_time_secs: f64,
    },

    /// Publish a full playback-state snapshot (from any device)
    SyncPlaybackState(PlaybackState),

    /// Request the stored playback state
    GetPlaybackState,

    /// Keep-alive round trip
    Heartbeat,
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages pushed from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Connection established and authenticated
    Connected(ConnectedPayload),

    /// Error occurred; delivered only to the offending connection
    Error(ErrorPayload),

    /// Device registration accepted; carries the server-assigned id
    DeviceRegistered { device_id: String },

    /// Response to `GetConnectedDevices`
    DeviceList(DeviceListPayload),

    /// A device joined or left; sent to all of the user's connections
    DeviceListUpdated(DeviceListPayload),

    /// The active-device pointer moved
    ActiveDeviceChanged { active_device_id: String },

    /// Relay: resume playback
    Play,

    /// Relay: pause playback
    Pause,

    /// Relay: skip forward
    Next,

    /// Relay: skip back
    Previous,

    /// Relay: set volume
    SetVolume { volume: u8 },

    /// Relay: start a specific song
    PlaySong {
        song_id: String,
        start_time_secs: f64,
    },

    /// Playback-state snapshot (broadcast fan-out or `GetPlaybackState` reply)
    PlaybackStateUpdated(PlaybackState),

    /// Heartbeat response
    Pong { server_time: i64 },
}

// =============================================================================
// Payload Types
// =============================================================================

/// Payload for Connected message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Transport-level connection identifier
    pub connection_id: Uuid,
    /// Current active device (if any)
    pub active_device_id: Option<String>,
}

/// Device list with the active pointer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceListPayload {
    pub devices: Vec<Device>,
    pub active_device_id: Option<String>,
}

/// Payload for Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new("AUTH_FAILED", message)
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::new("INVALID_MESSAGE", message)
    }

    pub fn invalid_device_id(message: impl Into<String>) -> Self {
        Self::new("INVALID_DEVICE_ID", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}
