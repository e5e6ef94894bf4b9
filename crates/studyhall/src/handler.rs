//! Per-connection handler: credential check, event loop, and dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Verify the connection-time credential → get an `Identity`
//!   2. Register the connection's event channel with the router
//!   3. Loop: receive client events → dispatch to the session layer
//!
//! Everything outbound — room broadcasts, personal notifications, error
//! rejections — funnels through one per-connection channel drained by a
//! single writer task, so events reach the socket in the order they
//! were queued.

use std::sync::Arc;

use studyhall_protocol::{
    ClientEvent, Codec, ErrorCode, ServerEvent,
};
use studyhall_session::{
    AuthError, EventSender, Identity, IdentityVerifier, SessionError,
    SessionStore,
};
use studyhall_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::EngineState;
use crate::EngineError;

/// Drop guard that releases a connection's bindings when the handler
/// exits.
///
/// This ensures cleanup happens even if the handler panics. Since
/// `Drop` is synchronous, we spawn a fire-and-forget task: deregister
/// from the router, and if the connection was bound to a room, release
/// the participant there (which flips them inactive and tells the
/// room). Transport disconnect is the only place departure is
/// observed, and this is where it cascades from.
struct ConnGuard<V: IdentityVerifier, S: SessionStore> {
    conn_id: ConnectionId,
    identity: Identity,
    state: Arc<EngineState<V, S>>,
}

impl<V: IdentityVerifier, S: SessionStore> Drop for ConnGuard<V, S> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let user_id = self.identity.user_id.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.router.deregister(&user_id, conn_id).await;
            if let Some(room_code) = state.gateway.unbind(conn_id).await {
                if let Err(e) =
                    state.sessions.leave_session(&room_code, &user_id).await
                {
                    tracing::debug!(
                        %conn_id,
                        user = %user_id,
                        room = %room_code,
                        error = %e,
                        "disconnect cleanup failed"
                    );
                }
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<V, S>(
    conn: WebSocketConnection,
    state: Arc<EngineState<V, S>>,
) -> Result<(), EngineError>
where
    V: IdentityVerifier,
    S: SessionStore,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Verify the credential ---
    let identity = match verify_credential(&conn, &state).await {
        Ok(identity) => identity,
        Err(e) => {
            refuse(&conn, &state.codec, &e).await?;
            return Err(EngineError::Auth(e));
        }
    };

    tracing::info!(
        %conn_id,
        user = %identity.user_id,
        "participant authenticated"
    );

    // --- Step 2: Outbound channel and writer task ---
    // The sender is handed to the router (personal channel) and, on
    // join, to the room (broadcasts). One writer task owns the socket's
    // send side; the channel preserves queue order.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.router.register(&identity.user_id, conn_id, tx.clone()).await;

    let conn = Arc::new(conn);
    let writer_conn = Arc::clone(&conn);
    let writer_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match writer_state.codec.encode(&event) {
                Ok(bytes) => {
                    if writer_conn.send(&bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode outbound event");
                }
            }
        }
    });

    let _guard = ConnGuard {
        conn_id,
        identity: identity.clone(),
        state: Arc::clone(&state),
    };

    // --- Step 3: Event loop ---
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(
                    %conn_id,
                    user = %identity.user_id,
                    "connection closed cleanly"
                );
                break;
            }
            Err(e) => {
                tracing::debug!(
                    %conn_id,
                    user = %identity.user_id,
                    error = %e,
                    "recv error"
                );
                break;
            }
        };

        let event: ClientEvent = match state.codec.decode(&data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    user = %identity.user_id,
                    error = %e,
                    "failed to decode client event"
                );
                let _ = tx.send(ServerEvent::Error {
                    code: ErrorCode::BadRequest,
                    message: "malformed event".into(),
                });
                continue;
            }
        };

        dispatch(event, conn_id, &identity, &tx, &state).await;
    }

    // _guard drops here → router deregistration and room release fire.
    Ok(())
}

/// Pulls the connection-time credential and runs it through the
/// verifier.
async fn verify_credential<V, S>(
    conn: &WebSocketConnection,
    state: &Arc<EngineState<V, S>>,
) -> Result<Identity, AuthError>
where
    V: IdentityVerifier,
    S: SessionStore,
{
    let credential = conn.credential().ok_or(AuthError::MissingCredential)?;
    state.verifier.verify(credential).await
}

/// Tells a client why it is being turned away, then closes.
///
/// Authentication happens exactly once per connection; a refused client
/// has to reconnect with a valid credential, so there is nothing to
/// keep open here.
async fn refuse(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    error: &AuthError,
) -> Result<(), EngineError> {
    let event = ServerEvent::Error {
        code: ErrorCode::Auth,
        message: error.to_string(),
    };
    let bytes = codec.encode(&event)?;
    conn.send(&bytes).await.map_err(EngineError::Transport)?;
    conn.close().await.map_err(EngineError::Transport)?;
    Ok(())
}

/// Routes one client event to the session layer.
///
/// Rejections go back to the initiating connection as `error` events;
/// everything a third party needs to hear comes out of the room itself.
async fn dispatch<V, S>(
    event: ClientEvent,
    conn_id: ConnectionId,
    identity: &Identity,
    tx: &EventSender,
    state: &Arc<EngineState<V, S>>,
) where
    V: IdentityVerifier,
    S: SessionStore,
{
    match event {
        ClientEvent::Join { room_code } => {
            // Re-binding releases the old room first. Same-room joins
            // skip the release: the session layer treats them as a
            // channel refresh, not a departure.
            if let Some(previous) = state.gateway.unbind(conn_id).await {
                if previous != room_code {
                    if let Err(e) = state
                        .sessions
                        .leave_session(&previous, &identity.user_id)
                        .await
                    {
                        tracing::debug!(
                            user = %identity.user_id,
                            room = %previous,
                            error = %e,
                            "implicit leave failed"
                        );
                    }
                }
            }

            match state
                .sessions
                .join_session(&room_code, identity.clone(), tx.clone())
                .await
            {
                // The room already queued `session.state` on admission.
                Ok(_) => {
                    state.gateway.bind(conn_id, room_code).await;
                }
                Err(e) => reject(tx, &e),
            }
        }

        ClientEvent::Leave {} => match state.gateway.unbind(conn_id).await {
            Some(room_code) => {
                if let Err(e) = state
                    .sessions
                    .leave_session(&room_code, &identity.user_id)
                    .await
                {
                    reject(tx, &e);
                }
            }
            None => reject_unbound(tx),
        },

        ClientEvent::ScoreUpdate { room_code, score } => {
            // The room broadcasts the fresh standings on success; the
            // caller needs nothing back.
            if let Err(e) = state
                .sessions
                .update_score(&room_code, &identity.user_id, score)
                .await
            {
                reject(tx, &e);
            }
        }

        ClientEvent::End { room_code } => {
            match state
                .sessions
                .end_session(&room_code, &identity.user_id)
                .await
            {
                Ok(()) => {
                    // The ender's own binding is stale now; others'
                    // bindings resolve lazily (the room is gone, so any
                    // later use answers SessionInactive).
                    if state.gateway.current(conn_id).await.as_ref()
                        == Some(&room_code)
                    {
                        state.gateway.unbind(conn_id).await;
                    }
                }
                Err(e) => reject(tx, &e),
            }
        }

        ClientEvent::Kick { room_code, user_id: target } => {
            match state
                .sessions
                .kick(&room_code, &identity.user_id, &target)
                .await
            {
                Ok(()) => {
                    // Detach every connection the kicked user had
                    // pointed at this room.
                    for conn in state.router.connections_of(&target).await {
                        if state.gateway.current(conn).await.as_ref()
                            == Some(&room_code)
                        {
                            state.gateway.unbind(conn).await;
                        }
                    }
                }
                Err(e) => reject(tx, &e),
            }
        }

        ClientEvent::Chat { text } => {
            match state.gateway.current(conn_id).await {
                Some(room_code) => {
                    if let Err(e) = state
                        .sessions
                        .chat(&room_code, &identity.user_id, text)
                        .await
                    {
                        reject(tx, &e);
                    }
                }
                None => reject_unbound(tx),
            }
        }

        ClientEvent::Typing { is_typing } => {
            match state.gateway.current(conn_id).await {
                Some(room_code) => {
                    if let Err(e) = state
                        .sessions
                        .typing(&room_code, &identity.user_id, is_typing)
                        .await
                    {
                        reject(tx, &e);
                    }
                }
                None => reject_unbound(tx),
            }
        }
    }
}

/// Queues a typed rejection on the connection's outbound channel.
fn reject(tx: &EventSender, error: &SessionError) {
    let _ = tx.send(ServerEvent::Error {
        code: error_code(error),
        message: error.to_string(),
    });
}

/// Rejection for room-scoped events from a connection bound to no room.
fn reject_unbound(tx: &EventSender) {
    let _ = tx.send(ServerEvent::Error {
        code: ErrorCode::NotParticipant,
        message: "not currently in a session".into(),
    });
}

/// Maps a session-layer error onto its wire error code.
fn error_code(error: &SessionError) -> ErrorCode {
    match error {
        SessionError::NotFound(_) => ErrorCode::NotFound,
        SessionError::Inactive(_) => ErrorCode::SessionInactive,
        SessionError::Full(_) => ErrorCode::Full,
        SessionError::Forbidden(_) => ErrorCode::Forbidden,
        SessionError::NotParticipant(_, _) => ErrorCode::NotParticipant,
        SessionError::InvalidConfig(_) | SessionError::CodesExhausted => {
            ErrorCode::BadRequest
        }
    }
}
