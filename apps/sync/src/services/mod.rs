//! Services for the Unison sync server
//!
//! This module contains the supporting services around the sync core:
//! - Access-token verification for connection authentication
//! - Health checks for the backing store

pub mod auth;
pub mod health;

pub use auth::{AuthConfig, AuthService};
pub use health::HealthService;
