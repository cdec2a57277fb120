//! Device registry and active-device selection
//!
//! Tracks every registered device per user, keyed by its transport
//! connection, together with the per-user active-device pointer. All state
//! is partitioned by user id; no cross-user locking exists.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use unison_protocol::{Device, ServerMessage};

/// Handle for sending messages to a specific connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Channel for sending messages to this connection
    pub sender: mpsc::UnboundedSender<ServerMessage>,

    /// The device registered on this connection
    pub device: Device,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>, device: Device) -> Self {
        Self { sender, device }
    }

    /// Send a message to this connection
    #[allow(clippy::result_large_err)]
    pub fn send(&self, msg: ServerMessage) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.sender.send(msg)
    }

    /// Check if the connection is still alive
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// State for a single user's devices
#[derive(Debug, Default)]
pub struct UserDevices {
    /// Map of connection_id -> ConnectionHandle
    ///
    /// A connection carries at most one device; re-registration replaces
    /// the entry.
    devices: DashMap<Uuid, ConnectionHandle>,

    /// Currently active device (drives audio output)
    ///
    /// Never cleared on disconnect; a pointer naming a device that is no
    /// longer registered reads as "no active device" downstream.
    active_device_id: Option<String>,
}

/// Manages registered devices for all users
///
/// Thread-safe structure for tracking device connections across the
/// application. Uses DashMap for concurrent access without explicit
/// locking. Wrapped in Arc for cheap cloning.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    /// Map of user_id -> UserDevices
    users: Arc<DashMap<Uuid, UserDevices>>,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new() -> Self {
        Self {
            users: Arc::new(DashMap::new()),
        }
    }

    /// Register a device on a connection, replacing any previous entry
    ///
    /// Returns true if the device set went from empty to one entry, in
    /// which case the new device has been made active.
    pub fn add_device(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<ServerMessage>,
        device: Device,
    ) -> bool {
        let mut user = self.users.entry(user_id).or_default();
        let was_empty = user.devices.is_empty();

        let device_id = device.device_id.clone();
        user.devices
            .insert(connection_id, ConnectionHandle::new(sender, device));

        if was_empty {
            user.active_device_id = Some(device_id.clone());
        }

        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            device_id = %device_id,
            device_count = user.devices.len(),
            auto_activated = was_empty,
            "Device registered"
        );

        was_empty
    }

    /// Remove the device entry for a connection
    ///
    /// Idempotent: removing an absent connection is a no-op. The active
    /// pointer is left untouched even when it names the removed device.
    pub fn remove_connection(&self, user_id: Uuid, connection_id: Uuid) -> Option<Device> {
        let removed = {
            let user = self.users.get_mut(&user_id)?;
            user.devices.remove(&connection_id).map(|(_, h)| h.device)
        };

        self.users.remove_if(&user_id, |_, u| u.devices.is_empty());

        if let Some(ref device) = removed {
            tracing::debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                device_id = %device.device_id,
                "Device removed"
            );
        }

        removed
    }

    /// Get the current device set (empty for an unknown user)
    pub fn list_devices(&self, user_id: Uuid) -> Vec<Device> {
        self.users
            .get(&user_id)
            .map(|u| u.devices.iter().map(|e| e.value().device.clone()).collect())
            .unwrap_or_default()
    }

    /// Get the number of registered devices for a user
    pub fn device_count(&self, user_id: Uuid) -> usize {
        self.users.get(&user_id).map(|u| u.devices.len()).unwrap_or(0)
    }

    /// Get the active device ID for a user
    pub fn active_device(&self, user_id: Uuid) -> Option<String> {
        self.users
            .get(&user_id)
            .and_then(|u| u.active_device_id.clone())
    }

    /// Set the active device for a user, unconditionally
    pub fn set_active_device(&self, user_id: Uuid, device_id: &str) {
        let mut user = self.users.entry(user_id).or_default();
        user.active_device_id = Some(device_id.to_string());
    }

    /// Resolve a device ID to its live connection, if any
    pub fn connection_of_device(&self, user_id: Uuid, device_id: &str) -> Option<Uuid> {
        self.users.get(&user_id).and_then(|u| {
            u.devices
                .iter()
                .find(|e| e.value().device.device_id == device_id)
                .map(|e| *e.key())
        })
    }

    /// Get the device registered on a connection, if any
    pub fn device_for_connection(&self, user_id: Uuid, connection_id: Uuid) -> Option<Device> {
        self.users
            .get(&user_id)
            .and_then(|u| u.devices.get(&connection_id).map(|h| h.device.clone()))
    }

    /// Send a message to a specific connection
    pub fn send_to_connection(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
        msg: ServerMessage,
    ) -> Result<(), SendError> {
        let user = self.users.get(&user_id).ok_or(SendError::UserNotFound)?;

        let handle = user
            .devices
            .get(&connection_id)
            .ok_or(SendError::ConnectionNotFound)?;

        handle.send(msg).map_err(|_| SendError::ConnectionClosed)?;

        Ok(())
    }

    /// Send a message to all of a user's connections
    pub fn broadcast_to_user(&self, user_id: Uuid, msg: ServerMessage) -> usize {
        let user = match self.users.get(&user_id) {
            Some(u) => u,
            None => return 0,
        };

        let mut sent = 0;
        for entry in user.devices.iter() {
            if entry.value().send(msg.clone()).is_ok() {
                sent += 1;
            }
        }

        sent
    }

    /// Send a message to all of a user's connections except the origin
    ///
    /// This is the transport-level echo suppression: an update is never
    /// redelivered to the connection it came from.
    pub fn broadcast_to_others(
        &self,
        user_id: Uuid,
        origin_connection_id: Uuid,
        msg: ServerMessage,
    ) -> usize {
        let user = match self.users.get(&user_id) {
            Some(u) => u,
            None => return 0,
        };

        let mut sent = 0;
        for entry in user.devices.iter() {
            if *entry.key() != origin_connection_id && entry.value().send(msg.clone()).is_ok() {
                sent += 1;
            }
        }

        sent
    }
}

/// Error type for send operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    UserNotFound,
    ConnectionNotFound,
    ConnectionClosed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::UserNotFound => write!(f, "user not found"),
            SendError::ConnectionNotFound => write!(f, "connection not found"),
            SendError::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for SendError {}
