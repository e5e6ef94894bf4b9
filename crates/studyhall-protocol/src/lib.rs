//! Wire protocol for Studyhall.
//!
//! This crate defines the "language" that clients and the engine speak:
//!
//! - **Identifiers** ([`UserId`], [`RoomCode`], [`SessionId`]) — the
//!   newtype keys everything else hangs off.
//! - **Records** ([`Session`], [`Participant`], [`LeaderboardEntry`],
//!   etc.) — the data model shared by the real-time plane, the control
//!   plane, and the store.
//! - **Events** ([`ClientEvent`], [`ServerEvent`], [`ErrorCode`]) —
//!   the frames that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how frames are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (participant state). It doesn't know about connections or rooms —
//! it only knows what the frames and records look like.
//!
//! ```text
//! Transport (bytes) → Protocol (events) → Session (rooms, scores)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod events;
mod ids;
mod records;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

// `pub use` makes items from submodules available at the crate root.
// Users can write `use studyhall_protocol::Session` instead of
// `use studyhall_protocol::records::Session`. This is a cleaner public API.

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{ClientEvent, ErrorCode, ServerEvent};
pub use ids::{RoomCode, SessionId, UserId};
pub use records::{
    Ack, CreateSessionRequest, ErrorBody, LeaderboardEntry, Page,
    Participant, Session, SessionKind, SessionList, SessionSettings,
    SessionSnapshot, SessionSummary,
};
