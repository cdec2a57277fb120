//! Common test infrastructure for sync integration tests
//!
//! Drives the session layer directly: each simulated device is a
//! [`SessionHandler`] plus the receiving half of its connection channel,
//! sharing one registry and one in-memory state store per harness.

#![allow(dead_code)]

use tokio::sync::mpsc;
use uuid::Uuid;

use unison_protocol::{ClientMessage, DeviceClass, ServerMessage};
use unison_sync::websocket::{ConnectionManager, PlaybackStore, SessionHandler};

/// One user's sync environment
pub struct SyncHarness {
    pub manager: ConnectionManager,
    pub store: PlaybackStore,
    pub user_id: Uuid,
}

impl SyncHarness {
    pub fn new() -> Self {
        Self {
            manager: ConnectionManager::new(),
            store: PlaybackStore::new_in_memory(),
            user_id: Uuid::new_v4(),
        }
    }

    /// Open a new connection session for this user
    pub fn connect(&self) -> ClientDevice {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = SessionHandler::new(
            self.user_id,
            Uuid::new_v4(),
            tx,
            self.manager.clone(),
            self.store.clone(),
        );
        ClientDevice {
            handler,
            rx,
            device_id: None,
        }
    }
}

/// A simulated device: one connection session and its push channel
pub struct ClientDevice {
    pub handler: SessionHandler,
    pub rx: mpsc::UnboundedReceiver<ServerMessage>,
    pub device_id: Option<String>,
}

impl ClientDevice {
    /// Register as a playback device and return the assigned id
    pub async fn register(&mut self, name: &str, class: DeviceClass) -> String {
        self.handler
            .handle_message(ClientMessage::RegisterDevice {
                device_name: name.to_string(),
                device_class: class,
            })
            .await;

        match self.rx.try_recv().expect("expected DeviceRegistered push") {
            ServerMessage::DeviceRegistered { device_id } => {
                self.device_id = Some(device_id.clone());
                device_id
            }
            other => panic!("expected DeviceRegistered, got {:?}", other),
        }
    }

    /// Send a client message through this device's session
    pub async fn send(&self, msg: ClientMessage) {
        self.handler.handle_message(msg).await;
    }

    /// Pop all queued pushes
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut msgs = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    /// Close this device's connection
    pub fn disconnect(&self) {
        self.handler.handle_disconnect();
    }
}
