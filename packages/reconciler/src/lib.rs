//! Client-side playback reconciler for Unison
//!
//! This crate keeps one device's local audio engine in agreement with the
//! user's shared playback session:
//! - applies incoming state and commands to the engine only while this
//!   device is the active device
//! - suppresses re-publication of engine events caused by a remote update
//!   (echo suppression via a short settle window)
//! - publishes local actions as outgoing sync calls while active, and
//!   forwards them as transport commands while not
//!
//! # Example
//!
//! ```rust,no_run
//! use tokio::sync::mpsc;
//! use unison_protocol::DeviceClass;
//! use unison_reconciler::{AudioEngine, Reconciler};
//!
//! struct NullEngine;
//!
//! impl AudioEngine for NullEngine {
//!     fn load(&mut self, _song_id: &str, _position_secs: f64) {}
//!     fn play(&mut self) {}
//!     fn pause(&mut self) {}
//!     fn stop(&mut self) {}
//!     fn set_volume(&mut self, _volume: u8) {}
//!     fn seek(&mut self, _position_secs: f64) {}
//! }
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, _rx) = mpsc::unbounded_channel();
//! let mut reconciler = Reconciler::new(NullEngine, tx);
//!
//! // Outgoing messages (registration, catch-up reads, sync calls) appear
//! // on the channel; feed every server push into handle_server_message.
//! reconciler.register("Web – Desktop", DeviceClass::Web)?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod reconciler;

pub use engine::{AudioEngine, EngineEvent};
pub use error::{ReconcilerError, ReconcilerResult};
pub use reconciler::{Reconciler, DEFAULT_SETTLE_MS};
