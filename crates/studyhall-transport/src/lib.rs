//! Transport abstraction layer for Studyhall.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! different network protocols. The engine above this layer deals only in
//! byte frames and connection IDs; it never sees sockets or HTTP upgrades.
//!
//! One transport-level concern leaks upward on purpose: the **credential**.
//! Browsers cannot set headers on a WebSocket, so the auth token arrives
//! as part of the upgrade request (`?token=` query parameter, or an
//! `Authorization: Bearer` header for non-browser clients). The transport
//! captures it during the handshake and exposes it via
//! [`Connection::credential`]; verifying it is the engine's job.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a connection.
///
/// Distinct from a user id: one user may hold several connections
/// (two browser tabs), and a connection exists before its user is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Returns the local address the transport is listening on.
    ///
    /// Useful when binding to port 0 and needing the OS-assigned port.
    fn local_addr(&self) -> Result<std::net::SocketAddr, Self::Error>;
}

/// A single connection that can send and receive byte frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the credential presented at connection time, if any.
    ///
    /// For WebSocket this is the `?token=` query parameter or the
    /// `Authorization: Bearer` header from the upgrade request. `None`
    /// means the client presented nothing — rejecting that is up to
    /// the layer that verifies identities.
    fn credential(&self) -> Option<&str>;
}
