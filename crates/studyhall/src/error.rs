//! Unified error type for the Studyhall engine.

use studyhall_protocol::ProtocolError;
use studyhall_session::{AuthError, SessionError, StoreError};
use studyhall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `studyhall` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid event).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A credential was missing or rejected by the identity verifier.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A session-level error (not found, full, forbidden, ended).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The external session store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
