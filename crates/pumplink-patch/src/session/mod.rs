//! Link session management
//!
//! Owns the reconnect sequence (connect → discover → enable notifications)
//! and the persistent link/adapter monitoring that keeps the patch-state
//! projection current between sequences.

mod manager;

pub use manager::ConnectionManager;

/// Phase of the reconnect sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    Idle,
    Connecting,
    Discovering,
    EnablingNotifications,
    Ready,
    Failed,
}
