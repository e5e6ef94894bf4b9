//! # Studyhall
//!
//! Real-time collaborative study session engine.
//!
//! Studyhall lets authenticated participants join shared, time-bounded
//! study sessions over WebSocket: live presence, concurrent score
//! updates, a ranked leaderboard every connected client agrees on, and
//! room-scoped chat. You bring the identity verifier and the session
//! store; the engine handles transport, rooms, and fan-out.
//!
//! Two surfaces:
//! - the **control plane** — [`Engine::sessions`] hands you a
//!   [`SessionManager`](studyhall_session::SessionManager) for
//!   create/list/end/lookup from your own request handlers;
//! - the **real-time plane** — clients connect over WebSocket with a
//!   bearer credential and speak the event protocol from
//!   [`studyhall_protocol`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studyhall::prelude::*;
//!
//! /// Development-only verifier: the credential is the user id.
//! struct TrustingVerifier;
//!
//! impl IdentityVerifier for TrustingVerifier {
//!     async fn verify(
//!         &self,
//!         credential: &str,
//!     ) -> Result<Identity, AuthError> {
//!         Ok(Identity {
//!             user_id: UserId::from(credential),
//!             display_name: credential.to_string(),
//!             role: Role::Student,
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EngineError> {
//!     let engine = EngineBuilder::new()
//!         .bind("127.0.0.1:8080")
//!         .build(TrustingVerifier, MemoryStore::new())
//!         .await?;
//!     engine.run().await
//! }
//! ```

mod error;
mod gateway;
mod handler;
mod router;
mod server;

pub use error::EngineError;
pub use router::Router;
pub use server::{Engine, EngineBuilder};

/// Everything an embedding application typically needs, in one import.
pub mod prelude {
    pub use crate::error::EngineError;
    pub use crate::router::Router;
    pub use crate::server::{Engine, EngineBuilder};

    pub use studyhall_protocol::{
        ClientEvent, Codec, ErrorCode, JsonCodec, LeaderboardEntry, Page,
        Participant, RoomCode, ServerEvent, Session, SessionId, SessionKind,
        SessionList, SessionSettings, SessionSnapshot, SessionSummary,
        UserId,
    };
    pub use studyhall_session::{
        AuthError, Identity, IdentityVerifier, MemoryStore, Role,
        SessionError, SessionManager, SessionStore, StoreError,
    };
    pub use studyhall_transport::{Connection, ConnectionId, Transport};
}
