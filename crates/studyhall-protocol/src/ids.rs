//! Identifier newtypes shared by every layer of Studyhall.
//!
//! Each identifier gets its own wrapper type instead of passing bare
//! strings and UUIDs around. The wrappers cost nothing at runtime but
//! make it impossible to hand a room code to a function that wanted a
//! user id — the compiler catches the mix-up.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// The opaque identifier the identity verifier resolves a credential to.
///
/// Studyhall never mints these — they come from whatever identity system
/// the embedding application uses (their auth provider's subject claim,
/// a database primary key, etc.). We only carry them around and use them
/// as map keys.
///
/// `#[serde(transparent)]` makes a `UserId("u-7")` serialize as the bare
/// string `"u-7"`, not as a wrapper object. Client SDKs expect plain
/// strings in the `userId` fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// The short shareable code participants type to join a session.
///
/// Codes are six characters from an uppercase alphabet with the
/// ambiguous glyphs (I, O, 0, 1) removed, so they survive being read
/// aloud or copied off a projector. A code is unique among *active*
/// sessions only — once a session ends its code eventually becomes
/// available again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// The durable identifier of a session record.
///
/// Unlike the room code (which is recycled), the session id names the
/// record forever — it's what the external store keys on and what
/// `session.ended` reports. UUIDv4 so ids minted by different processes
/// can't collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Mints a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =========================================================================
// Tests
// =========================================================================
