//! Error types for the session layer.

use studyhall_protocol::{RoomCode, UserId};

/// Errors that can occur during session operations.
///
/// Each variant maps onto exactly one wire
/// [`ErrorCode`](studyhall_protocol::ErrorCode), so the engine can turn
/// any of these into an `error` event without guessing.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No active session has this room code (and none recently ended
    /// with it either).
    #[error("no session with code {0}")]
    NotFound(RoomCode),

    /// The session exists but has ended. Distinct from [`NotFound`]
    /// so a client can tell "bad code" from "you're too late".
    ///
    /// [`NotFound`]: SessionError::NotFound
    #[error("session {0} has ended")]
    Inactive(RoomCode),

    /// The session is at its active-participant cap.
    #[error("session {0} is full")]
    Full(RoomCode),

    /// The caller may not do that: host-only command from a non-host,
    /// or a lapsed participant re-joining a session with late join
    /// disabled.
    #[error("not allowed: {0}")]
    Forbidden(String),

    /// The user is not an active participant of the session.
    #[error("user {0} is not a participant of session {1}")]
    NotParticipant(UserId, RoomCode),

    /// A session parameter was out of range at creation.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// Room code generation kept colliding with live sessions.
    /// With a 32-character alphabet and 6 positions this only happens
    /// when the active-session population is enormous.
    #[error("could not allocate a unique room code")]
    CodesExhausted,
}
