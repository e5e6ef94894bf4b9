//! The session manager: front door to every live room.
//!
//! The manager owns the room-code index and nothing else — all session
//! state lives in the per-room actors. Operations look up a
//! [`RoomHandle`] under a short lock, release it, and then talk to the
//! room, so two sessions never wait on each other.
//!
//! # Locking rule
//!
//! The registry mutex guards only the code → handle map. Nothing may
//! await a room reply while holding it: room actors themselves take
//! this lock when they retire, and a holder waiting on an actor that is
//! waiting on the lock would wedge both. Every method here clones the
//! handle out and drops the guard before awaiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use studyhall_protocol::{
    LeaderboardEntry, Page, Participant, RoomCode, SessionId,
    SessionKind, SessionList, SessionSettings, SessionSnapshot, UserId,
};
use tokio::sync::Mutex;

use crate::codes;
use crate::room::{spawn_room, EventSender, RoomHandle};
use crate::store::SessionStore;
use crate::{Identity, SessionError};

/// Hard cap on `max_participants` for any session.
const MAX_PARTICIPANT_LIMIT: usize = 200;

/// How many random codes to try before giving up on creation.
const MAX_CODE_ATTEMPTS: usize = 16;

/// Largest page size a listing will serve.
const MAX_PAGE_LIMIT: usize = 100;

/// How long an ended session's code keeps answering "ended" rather
/// than "not found".
const TOMBSTONE_TTL: Duration = Duration::from_secs(60 * 60);

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The code → room index, shared between the manager and the room
/// actors (which remove themselves from it when their session ends).
pub(crate) struct Registry {
    /// Live rooms by code.
    rooms: HashMap<RoomCode, RoomHandle>,

    /// Codes of recently ended sessions. Lets a straggler joining a
    /// just-ended session hear `SESSION_INACTIVE` instead of
    /// `NOT_FOUND`. Entries age out after [`TOMBSTONE_TTL`], or sooner
    /// if the code is handed to a new session.
    ended: HashMap<RoomCode, Instant>,
}

impl Registry {
    fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            ended: HashMap::new(),
        }
    }

    /// Removes a live room and tombstones its code.
    pub(crate) fn retire(&mut self, code: &RoomCode) {
        self.rooms.remove(code);
        self.prune_ended();
        self.ended.insert(code.clone(), Instant::now());
    }

    fn prune_ended(&mut self) {
        self.ended
            .retain(|_, retired_at| retired_at.elapsed() < TOMBSTONE_TTL);
    }

    /// Draws random codes until one is free of live rooms.
    fn allocate_code(&mut self) -> Result<RoomCode, SessionError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = codes::generate_code();
            if self.rooms.contains_key(&code) {
                continue;
            }
            // The code may be tombstoned from a long-gone session;
            // it belongs to the new one now.
            self.ended.remove(&code);
            return Ok(code);
        }
        Err(SessionError::CodesExhausted)
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Creates sessions and routes operations to them by room code.
///
/// Cloning is cheap and clones share all state, so handing one to every
/// connection handler is the intended usage.
pub struct SessionManager<S> {
    registry: Arc<Mutex<Registry>>,
    store: Arc<S>,
}

impl<S> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SessionStore> SessionManager<S> {
    /// Creates a manager with no live sessions.
    pub fn new(store: S) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            store: Arc::new(store),
        }
    }

    /// Creates a session with the given host and spawns its room.
    ///
    /// The host is admitted as the first participant immediately (their
    /// connection attaches later, through a normal join). Returns the
    /// initial snapshot.
    pub async fn create_session(
        &self,
        host: &Identity,
        kind: SessionKind,
        max_participants: usize,
        settings: SessionSettings,
    ) -> Result<SessionSnapshot, SessionError> {
        if !(1..=MAX_PARTICIPANT_LIMIT).contains(&max_participants) {
            return Err(SessionError::InvalidConfig(format!(
                "maxParticipants must be between 1 and {MAX_PARTICIPANT_LIMIT}, got {max_participants}"
            )));
        }
        if settings.time_limit_minutes == Some(0) {
            return Err(SessionError::InvalidConfig(
                "timeLimitMinutes must be at least 1".into(),
            ));
        }

        let now = Utc::now();
        let session_id = SessionId::new();
        let mut participants = HashMap::new();
        participants.insert(
            host.user_id.clone(),
            Participant {
                user_id: host.user_id.clone(),
                display_name: host.display_name.clone(),
                joined_at: now,
                joined_seq: 0,
                is_active: true,
                score: 0,
            },
        );

        let handle = {
            let mut registry = self.registry.lock().await;
            let room_code = registry.allocate_code()?;
            let session = studyhall_protocol::Session {
                session_id,
                room_code: room_code.clone(),
                kind,
                host_user_id: host.user_id.clone(),
                max_participants,
                is_active: true,
                settings,
                started_at: Some(now),
                ended_at: None,
            };
            let handle = spawn_room(
                session,
                participants,
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
            );
            registry.rooms.insert(room_code, handle.clone());
            handle
        };

        tracing::info!(
            room_code = %handle.room_code(),
            %session_id,
            host = %host.user_id,
            "session created"
        );
        handle.snapshot().await
    }

    /// Finds the live room for a code.
    ///
    /// Ended-but-remembered codes give [`SessionError::Inactive`];
    /// everything else gives [`SessionError::NotFound`].
    async fn lookup_handle(
        &self,
        room_code: &RoomCode,
    ) -> Result<RoomHandle, SessionError> {
        let registry = self.registry.lock().await;
        if let Some(handle) = registry.rooms.get(room_code) {
            return Ok(handle.clone());
        }
        if registry.ended.contains_key(room_code) {
            return Err(SessionError::Inactive(room_code.clone()));
        }
        Err(SessionError::NotFound(room_code.clone()))
    }

    /// Admits a user to a session and registers their event channel.
    pub async fn join_session(
        &self,
        room_code: &RoomCode,
        identity: Identity,
        sender: EventSender,
    ) -> Result<SessionSnapshot, SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.join(identity, sender).await
    }

    /// Releases a user's slot in a session.
    ///
    /// Leaving a session that already ended is a no-op, not an error —
    /// disconnect cleanup races session teardown all the time.
    pub async fn leave_session(
        &self,
        room_code: &RoomCode,
        user_id: &UserId,
    ) -> Result<(), SessionError> {
        match self.lookup_handle(room_code).await {
            Ok(handle) => match handle.leave(user_id.clone()).await {
                Err(SessionError::Inactive(_)) => Ok(()),
                other => other,
            },
            Err(SessionError::Inactive(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Sets a user's score (absolute; last write wins). Returns the
    /// standings after the write.
    pub async fn update_score(
        &self,
        room_code: &RoomCode,
        user_id: &UserId,
        score: u32,
    ) -> Result<Vec<LeaderboardEntry>, SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.update_score(user_id.clone(), score).await
    }

    /// Ends a session. Host only.
    pub async fn end_session(
        &self,
        room_code: &RoomCode,
        requester: &UserId,
    ) -> Result<(), SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.end(requester.clone()).await
    }

    /// Removes a participant from a session. Host only.
    pub async fn kick(
        &self,
        room_code: &RoomCode,
        requester: &UserId,
        target: &UserId,
    ) -> Result<(), SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.kick(requester.clone(), target.clone()).await
    }

    /// Relays a chat line into a session.
    pub async fn chat(
        &self,
        room_code: &RoomCode,
        user_id: &UserId,
        text: String,
    ) -> Result<(), SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.chat(user_id.clone(), text).await
    }

    /// Relays a typing indicator into a session.
    pub async fn typing(
        &self,
        room_code: &RoomCode,
        user_id: &UserId,
        is_typing: bool,
    ) -> Result<(), SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.typing(user_id.clone(), is_typing).await
    }

    /// Current standings for a session. Works regardless of the
    /// session's leaderboard visibility — visibility only limits
    /// broadcasts.
    pub async fn leaderboard(
        &self,
        room_code: &RoomCode,
    ) -> Result<Vec<LeaderboardEntry>, SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.leaderboard().await
    }

    /// Full snapshot of a live session.
    pub async fn session_snapshot(
        &self,
        room_code: &RoomCode,
    ) -> Result<SessionSnapshot, SessionError> {
        let handle = self.lookup_handle(room_code).await?;
        handle.snapshot().await
    }

    /// Lists live sessions, newest first.
    ///
    /// Rooms that end while the listing is being assembled are skipped.
    pub async fn list_sessions(&self, page: Page) -> SessionList {
        let handles: Vec<RoomHandle> = {
            let registry = self.registry.lock().await;
            registry.rooms.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(summary) = handle.summary().await {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| {
            b.started_at.cmp(&a.started_at).then_with(|| {
                a.room_code.as_str().cmp(b.room_code.as_str())
            })
        });

        let total = summaries.len();
        let page_no = page.page.max(1);
        let limit = page.limit.clamp(1, MAX_PAGE_LIMIT);
        let start = (page_no - 1).saturating_mul(limit);
        let sessions =
            summaries.into_iter().skip(start).take(limit).collect();

        SessionList {
            sessions,
            page: page_no,
            total,
        }
    }

    /// Brings a stored session back to life after a restart.
    ///
    /// The roster (scores, admission order) comes back exactly as
    /// saved; outbound channels start empty, so participants reattach
    /// by joining again. Time limits keep their original deadline —
    /// an overdue session ends immediately.
    pub async fn resume(
        &self,
        snapshot: SessionSnapshot,
    ) -> Result<SessionSnapshot, SessionError> {
        if !snapshot.session.is_active {
            return Err(SessionError::Inactive(
                snapshot.session.room_code.clone(),
            ));
        }

        let participants: HashMap<UserId, Participant> = snapshot
            .participants
            .into_iter()
            .map(|p| (p.user_id.clone(), p))
            .collect();

        let handle = {
            let mut registry = self.registry.lock().await;
            if registry.rooms.contains_key(&snapshot.session.room_code) {
                return Err(SessionError::InvalidConfig(format!(
                    "room code {} is already in use by a live session",
                    snapshot.session.room_code
                )));
            }
            registry.ended.remove(&snapshot.session.room_code);
            let room_code = snapshot.session.room_code.clone();
            let handle = spawn_room(
                snapshot.session,
                participants,
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
            );
            registry.rooms.insert(room_code, handle.clone());
            handle
        };

        tracing::info!(room_code = %handle.room_code(), "session resumed");
        handle.snapshot().await
    }

    /// Number of live sessions.
    pub async fn live_session_count(&self) -> usize {
        self.registry.lock().await.rooms.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
