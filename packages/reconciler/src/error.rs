//! Reconciler error types

use thiserror::Error;

/// Errors surfaced by the reconciler
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The outgoing channel to the connection is closed
    #[error("connection closed")]
    Disconnected,

    /// A local command arrived before the initial catch-up completed
    #[error("initial state sync not complete")]
    NotSynced,
}

/// Result type for reconciler operations
pub type ReconcilerResult<T> = Result<T, ReconcilerError>;
