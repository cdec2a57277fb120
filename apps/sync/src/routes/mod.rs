//! HTTP route handlers for the Unison sync server
//!
//! The only REST surface is operational: health and readiness probes. All
//! sync traffic runs over the WebSocket endpoint.

pub mod health;

pub use health::{health_router, HealthState};
