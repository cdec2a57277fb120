//! Wire protocol for Unison playback synchronization
//!
//! This crate defines the message protocol spoken between Unison clients and
//! the sync server, plus the playback data model both sides share:
//! - [`ClientMessage`] / [`ServerMessage`] JSON envelopes
//! - [`PlaybackState`], [`Device`], [`DeviceClass`]
//! - device identifier validation
//!
//! Messages are serialized as JSON with a `type`/`payload` envelope.

mod messages;
mod state;

pub use messages::{
    ClientMessage, ConnectedPayload, DeviceListPayload, ErrorPayload, ServerMessage,
};
pub use state::{validate_device_id, Device, DeviceClass, PlaybackState};
