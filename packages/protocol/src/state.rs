//! Playback data model shared between server and clients

use serde::{Deserialize, Serialize};

/// Maximum accepted length for a device identifier
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Default volume for a user with no stored playback state
pub const DEFAULT_VOLUME: u8 = 100;

/// The per-user "now playing" record
///
/// One record exists per user and is shared by every device of that user.
/// Consistency is last-writer-wins; `last_updated` strictly increases on
/// every accepted write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackState {
    /// Currently playing song ID (None if nothing is loaded)
    pub current_song_id: Option<String>,

    /// Whether playback is active
    pub is_playing: bool,

    /// Current position in seconds
    pub position_secs: f64,

    /// Volume level (0-100)
    pub volume: u8,

    /// Ordered play queue of song IDs (duplicates allowed)
    pub queue: Vec<String>,

    /// Unix timestamp (ms) of the last accepted write
    pub last_updated: i64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_song_id: None,
            is_playing: false,
            position_secs: 0.0,
            volume: DEFAULT_VOLUME,
            queue: Vec::new(),
            last_updated: 0,
        }
    }
}

impl PlaybackState {
    /// Create an empty state stamped with the current time
    pub fn new() -> Self {
        Self {
            last_updated: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }

    /// Clamp fields to their valid ranges
    ///
    /// Volume is capped at 100; a negative or non-finite position collapses
    /// to zero.
    pub fn sanitize(&mut self) {
        if self.volume > 100 {
            self.volume = 100;
        }
        if !self.position_secs.is_finite() || self.position_secs < 0.0 {
            self.position_secs = 0.0;
        }
    }
}

/// One registered client device
///
/// A device is bound to exactly one live connection; the transport-level
/// connection handle is not part of the wire model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    /// Server-generated opaque identifier, stable for one connection
    pub device_id: String,

    /// Human-readable label, e.g. "Web – Desktop"
    pub name: String,

    /// Device class
    pub class: DeviceClass,

    /// When the device registered (Unix timestamp ms)
    pub connected_at: i64,
}

/// Device class categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Web,
    Mobile,
    Desktop,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Web => write!(f, "web"),
            DeviceClass::Mobile => write!(f, "mobile"),
            DeviceClass::Desktop => write!(f, "desktop"),
        }
    }
}

impl std::str::FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(DeviceClass::Web),
            "mobile" => Ok(DeviceClass::Mobile),
            "desktop" => Ok(DeviceClass::Desktop),
            other => Err(format!("unknown device class: {}", other)),
        }
    }
}

/// Validate device ID format
///
/// Accepts 1-128 characters from `[A-Za-z0-9_-]`. Anything else is a
/// malformed identifier and must be rejected back to the caller rather than
/// silently dropped.
pub fn validate_device_id(device_id: &str) -> Result<(), &'static str> {
    if device_id.is_empty() {
        return Err("device_id cannot be empty");
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err("device_id must be at most 128 characters");
    }
    if !device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("device_id contains invalid characters");
    }
    Ok(())
}
