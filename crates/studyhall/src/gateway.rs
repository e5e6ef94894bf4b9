//! Connection-to-room binding table.
//!
//! The gateway answers one question: which room is this connection in?
//! A connection is bound to at most one room at a time. Binding while
//! already bound displaces the old binding (the handler uses the
//! returned room to emit the implicit leave), and unbinding twice is a
//! no-op — disconnect cleanup and kick handling race each other, so
//! every mutation here has to be idempotent.
//!
//! The table never touches session state itself. It records where a
//! connection points; actually admitting or releasing the participant
//! is the session layer's job.

use std::collections::HashMap;

use studyhall_protocol::RoomCode;
use studyhall_transport::ConnectionId;
use tokio::sync::Mutex;

/// Tracks which room each live connection is bound to.
#[derive(Default)]
pub(crate) struct Gateway {
    bindings: Mutex<HashMap<ConnectionId, RoomCode>>,
}

impl Gateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Points a connection at a room. Returns the room it was bound to
    /// before, if any.
    pub(crate) async fn bind(
        &self,
        conn_id: ConnectionId,
        room_code: RoomCode,
    ) -> Option<RoomCode> {
        self.bindings.lock().await.insert(conn_id, room_code)
    }

    /// Clears a connection's binding. Returns the room it was bound to.
    ///
    /// Unbinding an unbound connection returns `None` and changes
    /// nothing.
    pub(crate) async fn unbind(
        &self,
        conn_id: ConnectionId,
    ) -> Option<RoomCode> {
        self.bindings.lock().await.remove(&conn_id)
    }

    /// The room a connection is currently bound to, if any.
    pub(crate) async fn current(
        &self,
        conn_id: ConnectionId,
    ) -> Option<RoomCode> {
        self.bindings.lock().await.get(&conn_id).cloned()
    }
}

// =========================================================================
// Tests
// =========================================================================
