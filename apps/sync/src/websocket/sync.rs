//! Session message handling and state broadcast
//!
//! One [`SessionHandler`] exists per connection. It routes client messages
//! to the device registry, the command relay, and the playback-state store,
//! and fans state changes out to the user's other connections. The fan-out
//! always excludes the originating connection, which is what keeps a device
//! from hearing its own updates echoed back.

use tokio::sync::mpsc;
use uuid::Uuid;

use unison_protocol::{
    validate_device_id, ClientMessage, Device, DeviceClass, DeviceListPayload, ErrorPayload,
    PlaybackState, ServerMessage,
};

use super::connection::ConnectionManager;
use super::relay::{CommandRelay, TransportCommand};
use super::store::PlaybackStore;

/// Handles sync messages for a single connection
pub struct SessionHandler {
    user_id: Uuid,
    connection_id: Uuid,
    sender: mpsc::UnboundedSender<ServerMessage>,
    manager: ConnectionManager,
    store: PlaybackStore,
    relay: CommandRelay,
}

impl SessionHandler {
    /// Create a new handler for a connection
    pub fn new(
        user_id: Uuid,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<ServerMessage>,
        manager: ConnectionManager,
        store: PlaybackStore,
    ) -> Self {
        let relay = CommandRelay::new(user_id, connection_id, manager.clone(), store.clone());
        Self {
            user_id,
            connection_id,
            sender,
            manager,
            store,
            relay,
        }
    }

    /// Handle an incoming client message
    pub async fn handle_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::RegisterDevice {
                device_name,
                device_class,
            } => self.handle_register_device(device_name, device_class),
            ClientMessage::SelectActiveDevice { device_id } => {
                self.handle_select_active_device(device_id)
            }
            ClientMessage::GetConnectedDevices => self.handle_device_list_request(),
            ClientMessage::Play => self.relay.dispatch(TransportCommand::Play).await,
            ClientMessage::Pause => self.relay.dispatch(TransportCommand::Pause).await,
            ClientMessage::Next => self.relay.dispatch(TransportCommand::Next).await,
            ClientMessage::Previous => self.relay.dispatch(TransportCommand::Previous).await,
            ClientMessage::SetVolume { volume } => {
                self.relay
                    .dispatch(TransportCommand::SetVolume { volume })
                    .await
            }
            ClientMessage::PlaySong {
                song_id,
                start_time_secs,
            } => {
                self.relay
                    .dispatch(TransportCommand::PlaySong {
                        song_id,
                        start_time_secs,
                    })
                    .await
            }
            ClientMessage::SyncPlaybackState(state) => self.handle_state_sync(state).await,
            ClientMessage::GetPlaybackState => self.handle_state_request().await,
            ClientMessage::Heartbeat => self.handle_heartbeat(),
        }
    }

    /// Register this connection as a playback device
    ///
    /// The device id is generated server-side and is stable for the
    /// lifetime of this connection. The first device a user registers is
    /// made active automatically.
    fn handle_register_device(&self, device_name: String, device_class: DeviceClass) {
        let device = Device {
            device_id: Uuid::new_v4().to_string(),
            name: device_name,
            class: device_class,
            connected_at: chrono::Utc::now().timestamp_millis(),
        };
        let device_id = device.device_id.clone();

        let auto_activated = self.manager.add_device(
            self.user_id,
            self.connection_id,
            self.sender.clone(),
            device,
        );

        self.send_to_self(ServerMessage::DeviceRegistered {
            device_id: device_id.clone(),
        });
        self.broadcast_device_list();

        if auto_activated {
            self.manager.broadcast_to_user(
                self.user_id,
                ServerMessage::ActiveDeviceChanged {
                    active_device_id: device_id.clone(),
                },
            );
        }

        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            device_id = %device_id,
            auto_activated,
            "Device registered"
        );
    }

    /// Point the active-device selector at a device
    ///
    /// The pointer is set unconditionally for well-formed ids; only a
    /// malformed id is rejected, with an explicit error push so the caller
    /// can tell an invalid request from an ignored one.
    fn handle_select_active_device(&self, device_id: String) {
        if let Err(reason) = validate_device_id(&device_id) {
            tracing::debug!(
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                "Rejected active-device selection: {}",
                reason
            );
            self.send_error(ErrorPayload::invalid_device_id(reason));
            return;
        }

        self.manager.set_active_device(self.user_id, &device_id);

        self.manager.broadcast_to_user(
            self.user_id,
            ServerMessage::ActiveDeviceChanged {
                active_device_id: device_id,
            },
        );
    }

    /// Reply with the current device list and active pointer
    fn handle_device_list_request(&self) {
        self.send_to_self(ServerMessage::DeviceList(self.device_list_payload()));
    }

    /// Store a snapshot from any device and fan it out to the others
    async fn handle_state_sync(&self, state: PlaybackState) {
        let stored = self.store.set_state(self.user_id, state).await;

        let delivered = self.manager.broadcast_to_others(
            self.user_id,
            self.connection_id,
            ServerMessage::PlaybackStateUpdated(stored),
        );

        tracing::debug!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            delivered,
            "Playback state synced"
        );
    }

    /// Reply with the stored playback state
    async fn handle_state_request(&self) {
        let state = self.store.get_state(self.user_id).await;
        self.send_to_self(ServerMessage::PlaybackStateUpdated(state));
    }

    /// Heartbeat round trip
    fn handle_heartbeat(&self) {
        self.send_to_self(ServerMessage::Pong {
            server_time: chrono::Utc::now().timestamp_millis(),
        });
    }

    /// Tear down this connection's device entry and notify the others
    ///
    /// Called on socket close. Removal is idempotent and never touches the
    /// active pointer.
    pub fn handle_disconnect(&self) {
        if let Some(device) = self
            .manager
            .remove_connection(self.user_id, self.connection_id)
        {
            self.broadcast_device_list();
            tracing::info!(
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                device_id = %device.device_id,
                "Device disconnected"
            );
        }
    }

    fn device_list_payload(&self) -> DeviceListPayload {
        DeviceListPayload {
            devices: self.manager.list_devices(self.user_id),
            active_device_id: self.manager.active_device(self.user_id),
        }
    }

    /// Push the updated device list to all of the user's connections
    fn broadcast_device_list(&self) {
        self.manager.broadcast_to_user(
            self.user_id,
            ServerMessage::DeviceListUpdated(self.device_list_payload()),
        );
    }

    /// Send a message to this connection
    pub fn send_to_self(&self, msg: ServerMessage) {
        if self.sender.send(msg).is_err() {
            tracing::debug!(
                user_id = %self.user_id,
                connection_id = %self.connection_id,
                "Failed to send message to self"
            );
        }
    }

    /// Send an error to this connection
    pub fn send_error(&self, error: ErrorPayload) {
        self.send_to_self(ServerMessage::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct TestDevice {
        handler: SessionHandler,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    fn connect(
        user_id: Uuid,
        manager: &ConnectionManager,
        store: &PlaybackStore,
    ) -> TestDevice {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = SessionHandler::new(
            user_id,
            Uuid::new_v4(),
            tx,
            manager.clone(),
            store.clone(),
        );
        TestDevice { handler, rx }
    }

    async fn register(device: &mut TestDevice, name: &str) -> String {
        device
            .handler
            .handle_message(ClientMessage::RegisterDevice {
                device_name: name.to_string(),
                device_class: DeviceClass::Web,
            })
            .await;
        match device.rx.try_recv().unwrap() {
            ServerMessage::DeviceRegistered { device_id } => device_id,
            other => panic!("expected DeviceRegistered, got {:?}", other),
        }
    }

    fn drain(device: &mut TestDevice) -> Vec<ServerMessage> {
        let mut msgs = Vec::new();
        while let Ok(msg) = device.rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    #[tokio::test]
    async fn test_registration_message_sequence() {
        let manager = ConnectionManager::new();
        let store = PlaybackStore::new_in_memory();
        let user_id = Uuid::new_v4();
        let mut device = connect(user_id, &manager, &store);

        let device_id = register(&mut device, "Web Tab").await;

        // First registration: list update plus the auto-activation broadcast
        let msgs = drain(&mut device);
        assert_matches!(&msgs[0], ServerMessage::DeviceListUpdated(p) if p.devices.len() == 1);
        assert_matches!(
            &msgs[1],
            ServerMessage::ActiveDeviceChanged { active_device_id } if *active_device_id == device_id
        );
    }

    #[tokio::test]
    async fn test_select_active_device_broadcasts_to_all() {
        let manager = ConnectionManager::new();
        let store = PlaybackStore::new_in_memory();
        let user_id = Uuid::new_v4();
        let mut a = connect(user_id, &manager, &store);
        let mut b = connect(user_id, &manager, &store);

        register(&mut a, "A").await;
        let b_id = register(&mut b, "B").await;
        drain(&mut a);
        drain(&mut b);

        a.handler
            .handle_message(ClientMessage::SelectActiveDevice {
                device_id: b_id.clone(),
            })
            .await;

        for device in [&mut a, &mut b] {
            let msgs = drain(device);
            assert!(msgs.iter().any(|m| matches!(
                m,
                ServerMessage::ActiveDeviceChanged { active_device_id } if *active_device_id == b_id
            )));
        }
        assert_eq!(manager.active_device(user_id), Some(b_id));
    }

    #[tokio::test]
    async fn test_select_with_malformed_id_is_rejected() {
        let manager = ConnectionManager::new();
        let store = PlaybackStore::new_in_memory();
        let user_id = Uuid::new_v4();
        let mut a = connect(user_id, &manager, &store);
        register(&mut a, "A").await;
        drain(&mut a);

        a.handler
            .handle_message(ClientMessage::SelectActiveDevice {
                device_id: "not a valid id!".to_string(),
            })
            .await;

        let msgs = drain(&mut a);
        assert_eq!(msgs.len(), 1);
        assert_matches!(&msgs[0], ServerMessage::Error(e) if e.code == "INVALID_DEVICE_ID");
        // The pointer is untouched
        assert!(manager.active_device(user_id).is_some());
    }

    #[tokio::test]
    async fn test_state_sync_excludes_origin() {
        let manager = ConnectionManager::new();
        let store = PlaybackStore::new_in_memory();
        let user_id = Uuid::new_v4();
        let mut a = connect(user_id, &manager, &store);
        let mut b = connect(user_id, &manager, &store);
        let mut c = connect(user_id, &manager, &store);

        register(&mut a, "A").await;
        register(&mut b, "B").await;
        register(&mut c, "C").await;
        drain(&mut a);
        drain(&mut b);
        drain(&mut c);

        let state = PlaybackState {
            current_song_id: Some("song-1".to_string()),
            is_playing: true,
            ..Default::default()
        };
        a.handler
            .handle_message(ClientMessage::SyncPlaybackState(state))
            .await;

        assert!(drain(&mut a).is_empty(), "origin must not receive its echo");
        for device in [&mut b, &mut c] {
            let msgs = drain(device);
            assert_eq!(msgs.len(), 1);
            assert_matches!(
                &msgs[0],
                ServerMessage::PlaybackStateUpdated(s)
                    if s.current_song_id.as_deref() == Some("song-1")
            );
        }
    }

    #[tokio::test]
    async fn test_get_playback_state_replies_to_caller_only() {
        let manager = ConnectionManager::new();
        let store = PlaybackStore::new_in_memory();
        let user_id = Uuid::new_v4();
        let mut a = connect(user_id, &manager, &store);
        register(&mut a, "A").await;
        drain(&mut a);

        a.handler
            .handle_message(ClientMessage::GetPlaybackState)
            .await;

        let msgs = drain(&mut a);
        assert_eq!(msgs.len(), 1);
        assert_matches!(&msgs[0], ServerMessage::PlaybackStateUpdated(s) if !s.is_playing);
    }

    #[tokio::test]
    async fn test_heartbeat_pong() {
        let manager = ConnectionManager::new();
        let store = PlaybackStore::new_in_memory();
        let user_id = Uuid::new_v4();
        let mut a = connect(user_id, &manager, &store);

        a.handler.handle_message(ClientMessage::Heartbeat).await;

        assert_matches!(
            a.rx.try_recv().unwrap(),
            ServerMessage::Pong { server_time } if server_time > 0
        );
    }

    #[tokio::test]
    async fn test_disconnect_notifies_remaining_devices() {
        let manager = ConnectionManager::new();
        let store = PlaybackStore::new_in_memory();
        let user_id = Uuid::new_v4();
        let mut a = connect(user_id, &manager, &store);
        let mut b = connect(user_id, &manager, &store);

        register(&mut a, "A").await;
        register(&mut b, "B").await;
        drain(&mut a);
        drain(&mut b);

        a.handler.handle_disconnect();

        let msgs = drain(&mut b);
        assert_eq!(msgs.len(), 1);
        assert_matches!(&msgs[0], ServerMessage::DeviceListUpdated(p) if p.devices.len() == 1);
        // Idempotent: a second teardown emits nothing
        a.handler.handle_disconnect();
        assert!(drain(&mut b).is_empty());
    }
}
