//! WebSocket handlers for multi-device playback synchronization
//!
//! This module handles:
//! - Connection sessions (one authenticated socket per client process)
//! - The per-user device registry and active-device selection
//! - Transport-command relay to the active device
//! - Playback-state storage and fan-out to a user's other devices

pub mod connection;
pub mod handler;
pub mod relay;
pub mod store;
pub mod sync;

pub use connection::ConnectionManager;
pub use handler::ws_handler;
pub use store::{PlaybackStore, DEFAULT_STATE_TTL_SECS};
pub use sync::SessionHandler;
