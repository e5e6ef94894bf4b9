//! The event vocabulary: everything a client may send and everything
//! the engine may push back.
//!
//! Every frame on the wire is one JSON object with two keys:
//!
//! ```json
//! {"event": "session.join", "data": {"roomCode": "ABC234"}}
//! ```
//!
//! In serde terms that is an *adjacently tagged* enum — the variant
//! name travels in `"event"`, the payload in `"data"`. Two enums cover
//! the two directions:
//!
//! - [`ClientEvent`]: client → engine. Decoding one of these is the
//!   only parsing the engine ever does on a live connection.
//! - [`ServerEvent`]: engine → client. These are produced by session
//!   rooms and fan out to whichever connections the event's scope
//!   names.
//!
//! The two sets intentionally overlap on `chat.message` and
//! `typing.update`: a client sends the bare payload, the engine
//! rebroadcasts it stamped with the sender's identity. Keeping them in
//! separate enums means the engine can never accidentally echo a
//! client frame verbatim.

use serde::{Deserialize, Serialize};

use crate::{
    LeaderboardEntry, Participant, RoomCode, Session, SessionId, UserId,
};

// ---------------------------------------------------------------------------
// Client → engine
// ---------------------------------------------------------------------------

/// Events a client sends over its WebSocket connection.
///
/// Room-scoped commands (`score.update`, `session.end`, `session.kick`)
/// carry the room code explicitly; presence commands (`chat.message`,
/// `typing.update`) are routed by the connection's current room
/// binding instead, so a client can't speak into a room it hasn't
/// joined on this connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Enter the room with the given code. Binds this connection to
    /// the room; the reply is a full `session.state`.
    #[serde(rename = "session.join")]
    #[serde(rename_all = "camelCase")]
    Join { room_code: RoomCode },

    /// Give up the participant slot in the currently bound room.
    /// No payload — the binding says which room.
    #[serde(rename = "session.leave")]
    Leave {},

    /// Set the sender's score to an absolute value. Last write wins.
    #[serde(rename = "score.update")]
    #[serde(rename_all = "camelCase")]
    ScoreUpdate { room_code: RoomCode, score: u32 },

    /// End the session. Host only.
    #[serde(rename = "session.end")]
    #[serde(rename_all = "camelCase")]
    End { room_code: RoomCode },

    /// Remove another participant. Host only.
    #[serde(rename = "session.kick")]
    #[serde(rename_all = "camelCase")]
    Kick { room_code: RoomCode, user_id: UserId },

    /// Say something to the currently bound room.
    #[serde(rename = "chat.message")]
    Chat { text: String },

    /// Started/stopped typing, for the bound room's typing indicator.
    #[serde(rename = "typing.update")]
    #[serde(rename_all = "camelCase")]
    Typing { is_typing: bool },
}

// ---------------------------------------------------------------------------
// Engine → client
// ---------------------------------------------------------------------------

/// Events the engine pushes to clients.
///
/// Each variant documents its delivery scope, because scope is part of
/// the contract: `session.state` goes to the joiner alone,
/// `chat.message` to the whole room including the sender,
/// `typing.update` to everyone *except* the sender, and so on. Within
/// one room, every recipient observes these events in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full session state, sent to a client right after its join is
    /// accepted. Participants are in admission order.
    #[serde(rename = "session.state")]
    State {
        session: Session,
        participants: Vec<Participant>,
    },

    /// Someone was admitted. Room-wide, excluding the joiner (who gets
    /// `session.state` instead).
    #[serde(rename = "session.participantJoined")]
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        user_id: UserId,
        display_name: String,
    },

    /// Someone left, was kicked, or disconnected. Room-wide.
    #[serde(rename = "session.participantLeft")]
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { user_id: UserId },

    /// Ranked standings after a score or membership change. Room-wide
    /// when the leaderboard is visible, host-only when hidden.
    #[serde(rename = "leaderboard.update")]
    Leaderboard { entries: Vec<LeaderboardEntry> },

    /// The session is over. Room-wide, at most once per session.
    #[serde(rename = "session.ended")]
    #[serde(rename_all = "camelCase")]
    Ended { session_id: SessionId },

    /// A chat line, stamped with who said it. Room-wide including the
    /// sender, so every client renders the same transcript.
    #[serde(rename = "chat.message")]
    #[serde(rename_all = "camelCase")]
    Chat {
        user_id: UserId,
        display_name: String,
        text: String,
    },

    /// A typing indicator change. Room-wide excluding the sender.
    #[serde(rename = "typing.update")]
    #[serde(rename_all = "camelCase")]
    Typing { user_id: UserId, is_typing: bool },

    /// An application-defined message pushed through the engine's
    /// personal channel (e.g. "you were kicked", or anything an
    /// embedding server wants to deliver to one user). The payload is
    /// opaque to the engine.
    #[serde(rename = "notification")]
    Notification {
        event: String,
        data: serde_json::Value,
    },

    /// A request failed. Sent only to the offending connection; the
    /// connection stays open.
    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable reason inside an `error` event.
///
/// Codes are stable and SCREAMING_SNAKE_CASE on the wire; the
/// accompanying `message` is for humans and may change freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or unverifiable credential at connection time.
    Auth,
    /// No active session with that room code.
    NotFound,
    /// The session existed but has ended.
    SessionInactive,
    /// The session is at its participant cap.
    Full,
    /// The caller lacks the right to do that (host-only command, or
    /// re-joining a session that disallows late joins).
    Forbidden,
    /// The caller is not an active participant of the room.
    NotParticipant,
    /// The frame did not parse as a known event.
    BadRequest,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auth => "AUTH",
            Self::NotFound => "NOT_FOUND",
            Self::SessionInactive => "SESSION_INACTIVE",
            Self::Full => "FULL",
            Self::Forbidden => "FORBIDDEN",
            Self::NotParticipant => "NOT_PARTICIPANT",
            Self::BadRequest => "BAD_REQUEST",
        };
        write!(f, "{s}")
    }
}

// =========================================================================
// Tests
// =========================================================================
