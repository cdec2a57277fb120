//! Shared test utilities for the Unison workspace
//!
//! This crate provides fixtures and helpers used by both the sync server
//! and the client reconciler test suites, so the two stay in agreement on
//! what realistic playback data looks like.
//!
//! # Contents
//!
//! - [`PlaybackStateBuilder`] - fluent builder for playback snapshots
//! - [`device`] - registered-device fixture
//! - [`EnvGuard`] - scoped environment-variable override

mod env;
mod fixtures;

pub use env::EnvGuard;
pub use fixtures::{device, PlaybackStateBuilder};
