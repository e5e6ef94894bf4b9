//! Session rooms and lifecycle management for Studyhall.
//!
//! This crate is where the collaborative state lives. Each session runs
//! as an isolated Tokio task (actor model) that owns the participant
//! roster and scores; the [`SessionManager`] creates those actors,
//! routes operations to them by room code, and keeps the code →
//! session index.
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine (above)   ← binds connections to rooms, dispatches client events
//!     ↕
//! Session Layer (this crate)  ← rooms, participants, scores, lifecycle
//!     ↕
//! Protocol Layer (below)  ← provides Session, Participant, ServerEvent
//! ```
//!
//! # Key types
//!
//! - [`SessionManager`] — creates sessions, routes operations by room code
//! - [`RoomHandle`] — send commands to one running session room
//! - [`IdentityVerifier`] — the authentication hook embedders implement
//! - [`SessionStore`] — the persistence hook (with [`MemoryStore`] built in)
//! - [`SessionError`] — what can go wrong, mapped 1:1 onto wire error codes

#![allow(async_fn_in_trait)]

mod codes;
mod error;
mod identity;
mod manager;
mod room;
mod scoreboard;
mod store;

pub use error::SessionError;
pub use identity::{AuthError, Identity, IdentityVerifier, Role};
pub use manager::SessionManager;
pub use room::{EventSender, RoomHandle};
pub use store::{MemoryStore, SessionStore, StoreError};
