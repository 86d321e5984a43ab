//! Real-time room sessions.
//!
//! This module contains the long-lived side of the service: one lifecycle
//! task per active room, driven by events from a transport connection. It is
//! structured into submodules for clarity:
//!
//! - `transport`: the room transport contract and its WebSocket implementation.
//! - `lifecycle`: the per-room state machine and the room registry.

pub mod lifecycle;
pub mod transport;

pub use lifecycle::{RoomManager, RoomSettings, StartOutcome};
pub use transport::{ConnectOptions, RoomConnection, RoomEvent, RoomTransport, WsRoomTransport};

/// A room connect/transport failure. Logged, forces teardown, never retried
/// automatically, and never crashes the host process.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to connect to room: {0}")]
    Connect(String),
    #[error("room transport error: {0}")]
    Transport(String),
}
