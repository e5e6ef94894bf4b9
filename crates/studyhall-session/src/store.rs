//! Persistence hook for session state.
//!
//! The engine is the source of truth while a session is live; the store
//! is a write-behind copy for dashboards, history, and resuming after a
//! restart. Writes are **fire-and-forget**: a slow or failing store
//! must never block a join or a score update, so every save runs in its
//! own task with bounded retries and the room actor moves on
//! immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use studyhall_protocol::{SessionId, SessionSnapshot};
use tokio::sync::RwLock;

/// How many times a single snapshot save is attempted.
const MAX_SAVE_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles after each failure.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Errors a [`SessionStore`] can report.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store couldn't be reached or timed out. Worth retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation (constraint violation, auth).
    /// Retrying the same write will fail the same way.
    #[error("store denied the operation: {0}")]
    Denied(String),
}

impl StoreError {
    /// Whether a retry of the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Where session snapshots go.
///
/// Implement this against your database of choice. The engine calls
/// [`save`](SessionStore::save) after every state change (from a
/// background task — implementations may be slow without hurting the
/// real-time path) and [`load`](SessionStore::load) only when an
/// embedder resumes sessions after a restart.
pub trait SessionStore: Send + Sync + 'static {
    /// Persists a full snapshot, replacing any previous one for the
    /// same session id.
    fn save(
        &self,
        snapshot: &SessionSnapshot,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Fetches the latest snapshot for a session, if one was saved.
    fn load(
        &self,
        session_id: SessionId,
    ) -> impl std::future::Future<Output = Result<Option<SessionSnapshot>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-memory [`SessionStore`].
///
/// The default for tests and demos, and a reasonable choice for
/// deployments that don't need history to survive a restart. Cloning is
/// cheap — clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionSnapshot>>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many sessions have a stored snapshot.
    pub async fn snapshot_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl SessionStore for MemoryStore {
    async fn save(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(snapshot.session.session_id, snapshot.clone());
        Ok(())
    }

    async fn load(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Write-behind task
// ---------------------------------------------------------------------------

/// Saves a snapshot in the background with bounded retries.
///
/// Retryable failures back off (50ms, 100ms, ...) up to
/// [`MAX_SAVE_ATTEMPTS`]; non-retryable failures give up immediately.
/// Exhaustion is logged and the snapshot is dropped — the next state
/// change will write a fresher one anyway.
pub(crate) fn spawn_persist<S: SessionStore>(
    store: Arc<S>,
    snapshot: SessionSnapshot,
) {
    tokio::spawn(async move {
        let session_id = snapshot.session.session_id;
        let mut delay = RETRY_BASE_DELAY;
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            match store.save(&snapshot).await {
                Ok(()) => return,
                Err(e) if e.is_retryable() && attempt < MAX_SAVE_ATTEMPTS => {
                    tracing::debug!(
                        %session_id,
                        attempt,
                        error = %e,
                        "session save failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    tracing::warn!(
                        %session_id,
                        attempt,
                        error = %e,
                        "session save failed, giving up"
                    );
                    return;
                }
            }
        }
    });
}

// =========================================================================
// Tests
// =========================================================================
