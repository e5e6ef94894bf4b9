//! `Engine` builder and server loop.
//!
//! This is the entry point for running a Studyhall server. It ties
//! together all the layers: transport → protocol → session.

use std::sync::Arc;

use studyhall_protocol::JsonCodec;
use studyhall_session::{IdentityVerifier, SessionManager, SessionStore};
use studyhall_transport::{Transport, WebSocketTransport};

use crate::gateway::Gateway;
use crate::handler::handle_connection;
use crate::router::Router;
use crate::EngineError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// session manager carries its own interior synchronization, so no
/// outer lock sits between connections and their rooms.
pub(crate) struct EngineState<V: IdentityVerifier, S: SessionStore> {
    pub(crate) sessions: SessionManager<S>,
    pub(crate) verifier: V,
    pub(crate) codec: JsonCodec,
    pub(crate) gateway: Gateway,
    pub(crate) router: Arc<Router>,
}

/// Builder for configuring and starting a Studyhall engine.
///
/// # Example
///
/// ```rust,ignore
/// use studyhall::prelude::*;
///
/// let engine = EngineBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(my_verifier, my_store)
///     .await?;
/// engine.run().await
/// ```
pub struct EngineBuilder {
    bind_addr: String,
}

impl EngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Binds the listener and assembles the engine.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport` — what browser clients
    /// speak. The verifier and store are yours: any
    /// [`IdentityVerifier`] and any [`SessionStore`].
    pub async fn build<V: IdentityVerifier, S: SessionStore>(
        self,
        verifier: V,
        store: S,
    ) -> Result<Engine<V, S>, EngineError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(EngineState {
            sessions: SessionManager::new(store),
            verifier,
            codec: JsonCodec,
            gateway: Gateway::new(),
            router: Arc::new(Router::new()),
        });

        Ok(Engine { transport, state })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Studyhall engine.
///
/// Call [`run()`](Self::run) to start accepting connections. Before
/// that, grab [`sessions()`](Self::sessions) and
/// [`router()`](Self::router) — they are the control-plane handles the
/// embedding application keeps: create and list sessions through the
/// manager, push user notifications through the router, while the
/// engine owns the real-time plane.
pub struct Engine<V: IdentityVerifier, S: SessionStore> {
    transport: WebSocketTransport,
    state: Arc<EngineState<V, S>>,
}

impl<V, S> Engine<V, S>
where
    V: IdentityVerifier,
    S: SessionStore,
{
    /// Creates a new builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, EngineError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle to the session manager — the control plane.
    ///
    /// Clones are cheap and stay valid after [`run()`](Self::run)
    /// consumes the engine.
    pub fn sessions(&self) -> SessionManager<S> {
        self.state.sessions.clone()
    }

    /// A handle to the personal-channel router.
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.state.router)
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections, verifies each one's credential,
    /// and spawns a handler task per connected participant. Runs until
    /// the process is terminated.
    pub async fn run(mut self) -> Result<(), EngineError> {
        tracing::info!("studyhall engine running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
