//! Session room actor: an isolated Tokio task that owns one session.
//!
//! Each live session runs in its own task, communicating with the
//! outside world through an mpsc channel. This is the "actor model" —
//! no shared mutable state, just message passing. It buys two things:
//!
//! - **Per-room ordering.** The actor applies commands one at a time
//!   and pushes the resulting events into every participant's channel
//!   before touching the next command, so all participants observe the
//!   same event order.
//! - **Cross-room parallelism.** Rooms never contend with each other;
//!   a busy quiz can't slow down the lecture next door.
//!
//! The actor exits only when its session ends (host command or time
//! limit). A closed command channel therefore *means* the session is
//! over, which is why [`RoomHandle`] maps channel failures to
//! [`SessionError::Inactive`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use studyhall_protocol::{
    LeaderboardEntry, Participant, RoomCode, ServerEvent, Session,
    SessionSnapshot, SessionSummary, UserId,
};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::manager::Registry;
use crate::store::{self, SessionStore};
use crate::{scoreboard, Identity, SessionError};

/// Command channel size per room. Bounded so a stalled actor applies
/// backpressure to callers instead of buffering without limit.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Channel sender for delivering server events to one participant's
/// connection handler.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Commands sent to a room actor through its channel.
///
/// Each variant is one operation the outside world can request. The
/// `oneshot::Sender` in most variants is a "reply channel" — the caller
/// sends a command and waits for the response on it. Chat and typing
/// are fire-and-forget: there is nothing useful to reply.
pub(crate) enum RoomCommand {
    Join {
        identity: Identity,
        sender: EventSender,
        reply: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },
    Leave {
        user_id: UserId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    UpdateScore {
        user_id: UserId,
        score: u32,
        reply: oneshot::Sender<Result<Vec<LeaderboardEntry>, SessionError>>,
    },
    End {
        requester: UserId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Kick {
        requester: UserId,
        target: UserId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Chat {
        user_id: UserId,
        text: String,
    },
    Typing {
        user_id: UserId,
        is_typing: bool,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Leaderboard {
        reply: oneshot::Sender<Vec<LeaderboardEntry>>,
    },
    Summary {
        reply: oneshot::Sender<SessionSummary>,
    },
}

/// Handle to a running session room. Used to send commands to it.
///
/// Cheap to clone — it's just an `mpsc::Sender` wrapper. The
/// [`SessionManager`](crate::SessionManager) holds one per live room
/// and clones it out to callers so nobody awaits a room while holding
/// the registry lock.
#[derive(Clone)]
pub struct RoomHandle {
    room_code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// The code of the room this handle points at.
    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    /// Channel failure means the actor is gone, and the actor only
    /// exits after ending its session.
    fn gone(&self) -> SessionError {
        SessionError::Inactive(self.room_code.clone())
    }

    /// Admits (or re-admits) a user and registers their event channel.
    pub async fn join(
        &self,
        identity: Identity,
        sender: EventSender,
    ) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                identity,
                sender,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Releases a user's participant slot.
    pub async fn leave(
        &self,
        user_id: UserId,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Leave {
                user_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Sets a user's score to an absolute value (last write wins).
    pub async fn update_score(
        &self,
        user_id: UserId,
        score: u32,
    ) -> Result<Vec<LeaderboardEntry>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::UpdateScore {
                user_id,
                score,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Ends the session. Host only; the actor stops afterwards.
    pub async fn end(&self, requester: UserId) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::End {
                requester,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Removes another participant. Host only.
    pub async fn kick(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Kick {
                requester,
                target,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    /// Relays a chat line to the room (fire-and-forget).
    pub async fn chat(
        &self,
        user_id: UserId,
        text: String,
    ) -> Result<(), SessionError> {
        self.sender
            .send(RoomCommand::Chat { user_id, text })
            .await
            .map_err(|_| self.gone())
    }

    /// Relays a typing indicator to the room (fire-and-forget).
    pub async fn typing(
        &self,
        user_id: UserId,
        is_typing: bool,
    ) -> Result<(), SessionError> {
        self.sender
            .send(RoomCommand::Typing { user_id, is_typing })
            .await
            .map_err(|_| self.gone())
    }

    /// Requests a full snapshot of the session.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())
    }

    /// Requests the current standings.
    pub async fn leaderboard(
        &self,
    ) -> Result<Vec<LeaderboardEntry>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Leaderboard { reply: reply_tx })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())
    }

    /// Requests a one-line summary (for listings).
    pub async fn summary(&self) -> Result<SessionSummary, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Summary { reply: reply_tx })
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())
    }
}

/// How a join request relates to the existing roster.
enum Admission {
    /// Already an active participant — new tab or reconnect. Channel
    /// refresh only, no membership change, no broadcasts.
    Refresh,
    /// Was a participant, lapsed, and is coming back.
    Reactivated,
    /// First time in this session.
    New,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<S: SessionStore> {
    session: Session,
    participants: HashMap<UserId, Participant>,
    /// Per-participant outbound channels. A participant without an
    /// entry here (resumed session, dropped connection) simply misses
    /// events until they join again.
    senders: HashMap<UserId, EventSender>,
    /// Next admission sequence number. Strictly greater than every
    /// `joined_seq` in `participants`.
    next_seq: u64,
    store: Arc<S>,
    registry: Arc<Mutex<Registry>>,
    receiver: mpsc::Receiver<RoomCommand>,
    /// When the session's time limit elapses, if it has one.
    deadline: Option<tokio::time::Instant>,
}

impl<S: SessionStore> RoomActor<S> {
    /// Runs the actor loop, processing commands until the session ends.
    async fn run(mut self) {
        tracing::info!(
            room_code = %self.session.room_code,
            session_id = %self.session.session_id,
            "session room started"
        );

        // Initial write so the store knows this session exists even if
        // nothing else ever happens in it.
        self.persist();

        loop {
            let cmd = match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        cmd = self.receiver.recv() => cmd,
                        _ = tokio::time::sleep_until(deadline) => {
                            tracing::info!(
                                room_code = %self.session.room_code,
                                "time limit reached"
                            );
                            self.finish().await;
                            break;
                        }
                    }
                }
                None => self.receiver.recv().await,
            };

            let Some(cmd) = cmd else {
                // Registry dropped (process shutdown) — nothing left
                // to serve.
                break;
            };

            if self.handle_command(cmd).await {
                break;
            }
        }

        tracing::info!(
            room_code = %self.session.room_code,
            "session room stopped"
        );
    }

    /// Applies one command. Returns `true` when the actor should stop.
    async fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                identity,
                sender,
                reply,
            } => {
                let result = self.handle_join(identity, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Leave { user_id, reply } => {
                let _ = reply.send(self.handle_leave(&user_id));
            }
            RoomCommand::UpdateScore {
                user_id,
                score,
                reply,
            } => {
                let _ =
                    reply.send(self.handle_update_score(&user_id, score));
            }
            RoomCommand::End { requester, reply } => {
                if requester != self.session.host_user_id {
                    let _ = reply.send(Err(SessionError::Forbidden(
                        "only the host may end the session".into(),
                    )));
                } else {
                    self.finish().await;
                    let _ = reply.send(Ok(()));
                    return true;
                }
            }
            RoomCommand::Kick {
                requester,
                target,
                reply,
            } => {
                let _ = reply.send(self.handle_kick(&requester, &target));
            }
            RoomCommand::Chat { user_id, text } => {
                self.handle_chat(&user_id, text);
            }
            RoomCommand::Typing { user_id, is_typing } => {
                self.handle_typing(&user_id, is_typing);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::Leaderboard { reply } => {
                let _ = reply.send(self.ranked());
            }
            RoomCommand::Summary { reply } => {
                let _ = reply.send(self.summary());
            }
        }
        false
    }

    fn handle_join(
        &mut self,
        identity: Identity,
        sender: EventSender,
    ) -> Result<SessionSnapshot, SessionError> {
        let code = self.session.room_code.clone();
        let active_count = self.active_count();
        let capacity = self.session.max_participants;

        let admission = if let Some(existing) =
            self.participants.get_mut(&identity.user_id)
        {
            if existing.is_active {
                Admission::Refresh
            } else {
                if !self.session.settings.allow_late_join {
                    return Err(SessionError::Forbidden(
                        "re-joining this session is disabled".into(),
                    ));
                }
                // Lapsed participants hold no slot, so reactivation
                // competes for capacity like a fresh join.
                if active_count >= capacity {
                    return Err(SessionError::Full(code));
                }
                existing.is_active = true;
                Admission::Reactivated
            }
        } else {
            if active_count >= capacity {
                return Err(SessionError::Full(code));
            }
            Admission::New
        };

        if matches!(admission, Admission::New) {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.participants.insert(
                identity.user_id.clone(),
                Participant {
                    user_id: identity.user_id.clone(),
                    display_name: identity.display_name.clone(),
                    joined_at: Utc::now(),
                    joined_seq: seq,
                    is_active: true,
                    score: 0,
                },
            );
        }

        self.senders.insert(identity.user_id.clone(), sender);

        // The joiner's first event is always the full state, so
        // everything they see afterwards is a delta on it.
        self.send_to(
            &identity.user_id,
            ServerEvent::State {
                session: self.session.clone(),
                participants: self.ordered_participants(),
            },
        );

        match admission {
            Admission::Refresh => {
                tracing::debug!(
                    room_code = %self.session.room_code,
                    user_id = %identity.user_id,
                    "participant channel refreshed"
                );
            }
            Admission::Reactivated | Admission::New => {
                tracing::info!(
                    room_code = %self.session.room_code,
                    user_id = %identity.user_id,
                    active = self.active_count(),
                    "participant joined"
                );
                self.broadcast_except(
                    &identity.user_id,
                    ServerEvent::ParticipantJoined {
                        user_id: identity.user_id.clone(),
                        display_name: identity.display_name.clone(),
                    },
                );
                self.broadcast_leaderboard();
                self.persist();
            }
        }

        Ok(self.snapshot())
    }

    fn handle_leave(
        &mut self,
        user_id: &UserId,
    ) -> Result<(), SessionError> {
        match self.participants.get_mut(user_id) {
            None => Err(SessionError::NotParticipant(
                user_id.clone(),
                self.session.room_code.clone(),
            )),
            Some(p) if !p.is_active => {
                // Already out (double leave, or a disconnect racing a
                // kick). Just make sure the channel is gone.
                self.senders.remove(user_id);
                Ok(())
            }
            Some(p) => {
                p.is_active = false;
                self.senders.remove(user_id);
                tracing::info!(
                    room_code = %self.session.room_code,
                    %user_id,
                    active = self.active_count(),
                    "participant left"
                );
                self.broadcast(ServerEvent::ParticipantLeft {
                    user_id: user_id.clone(),
                });
                self.broadcast_leaderboard();
                self.persist();
                Ok(())
            }
        }
    }

    fn handle_update_score(
        &mut self,
        user_id: &UserId,
        score: u32,
    ) -> Result<Vec<LeaderboardEntry>, SessionError> {
        let code = self.session.room_code.clone();
        match self.participants.get_mut(user_id) {
            Some(p) if p.is_active => {
                let previous = p.score;
                p.score = score;
                tracing::debug!(
                    room_code = %code,
                    %user_id,
                    previous,
                    score,
                    "score updated"
                );
                self.broadcast_leaderboard();
                self.persist();
                Ok(self.ranked())
            }
            _ => Err(SessionError::NotParticipant(user_id.clone(), code)),
        }
    }

    fn handle_kick(
        &mut self,
        requester: &UserId,
        target: &UserId,
    ) -> Result<(), SessionError> {
        if *requester != self.session.host_user_id {
            return Err(SessionError::Forbidden(
                "only the host may kick participants".into(),
            ));
        }
        let code = self.session.room_code.clone();
        match self.participants.get_mut(target) {
            Some(p) if p.is_active => {
                p.is_active = false;

                // Tell the target why their room went quiet, before
                // dropping their channel.
                self.send_to(
                    target,
                    ServerEvent::Notification {
                        event: "session.kicked".to_string(),
                        data: serde_json::json!({
                            "roomCode": code.as_str(),
                        }),
                    },
                );
                self.senders.remove(target);

                tracing::info!(
                    room_code = %code,
                    %requester,
                    %target,
                    "participant kicked"
                );
                self.broadcast(ServerEvent::ParticipantLeft {
                    user_id: target.clone(),
                });
                self.broadcast_leaderboard();
                self.persist();
                Ok(())
            }
            _ => Err(SessionError::NotParticipant(target.clone(), code)),
        }
    }

    fn handle_chat(&mut self, user_id: &UserId, text: String) {
        let display_name = match self
            .participants
            .get(user_id)
            .filter(|p| p.is_active)
        {
            Some(p) => p.display_name.clone(),
            None => {
                tracing::warn!(
                    room_code = %self.session.room_code,
                    %user_id,
                    "chat from non-participant, ignoring"
                );
                return;
            }
        };
        // Everyone gets the line, sender included, so all clients
        // render the same transcript.
        self.broadcast(ServerEvent::Chat {
            user_id: user_id.clone(),
            display_name,
            text,
        });
    }

    fn handle_typing(&mut self, user_id: &UserId, is_typing: bool) {
        if !self
            .participants
            .get(user_id)
            .is_some_and(|p| p.is_active)
        {
            tracing::warn!(
                room_code = %self.session.room_code,
                %user_id,
                "typing update from non-participant, ignoring"
            );
            return;
        }
        // The sender already knows they're typing.
        self.broadcast_except(
            user_id,
            ServerEvent::Typing {
                user_id: user_id.clone(),
                is_typing,
            },
        );
    }

    /// Ends the session: flips the record, tells everyone once, writes
    /// the final snapshot, and retires the room code.
    async fn finish(&mut self) {
        if !self.session.is_active {
            return;
        }
        self.session.is_active = false;
        self.session.ended_at = Some(Utc::now());

        self.broadcast(ServerEvent::Ended {
            session_id: self.session.session_id,
        });
        self.senders.clear();
        self.persist();

        {
            let mut registry = self.registry.lock().await;
            registry.retire(&self.session.room_code);
        }

        tracing::info!(
            room_code = %self.session.room_code,
            session_id = %self.session.session_id,
            "session ended"
        );
    }

    // -----------------------------------------------------------------
    // Event delivery
    // -----------------------------------------------------------------

    /// Sends an event to every connected participant.
    fn broadcast(&self, event: ServerEvent) {
        for sender in self.senders.values() {
            let _ = sender.send(event.clone());
        }
    }

    /// Sends an event to everyone except one user.
    fn broadcast_except(&self, excluded: &UserId, event: ServerEvent) {
        for (user_id, sender) in &self.senders {
            if user_id != excluded {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Sends an event to a single participant. Silently drops if their
    /// channel is gone (connection died).
    fn send_to(&self, user_id: &UserId, event: ServerEvent) {
        if let Some(sender) = self.senders.get(user_id) {
            let _ = sender.send(event);
        }
    }

    /// Pushes fresh standings to whoever may see them: the whole room
    /// when the leaderboard is visible, the host alone when hidden.
    fn broadcast_leaderboard(&self) {
        let event = ServerEvent::Leaderboard {
            entries: self.ranked(),
        };
        if self.session.settings.leaderboard_visible {
            self.broadcast(event);
        } else {
            self.send_to(&self.session.host_user_id, event);
        }
    }

    // -----------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------

    fn active_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_active).count()
    }

    fn ranked(&self) -> Vec<LeaderboardEntry> {
        scoreboard::ranked(&self.participants)
    }

    fn ordered_participants(&self) -> Vec<Participant> {
        let mut participants: Vec<Participant> =
            self.participants.values().cloned().collect();
        participants.sort_by_key(|p| p.joined_seq);
        participants
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            participants: self.ordered_participants(),
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session.session_id,
            room_code: self.session.room_code.clone(),
            kind: self.session.kind,
            host_user_id: self.session.host_user_id.clone(),
            active_participants: self.active_count(),
            max_participants: self.session.max_participants,
            started_at: self.session.started_at,
        }
    }

    /// Hands the current snapshot to the write-behind store task.
    fn persist(&self) {
        store::spawn_persist(Arc::clone(&self.store), self.snapshot());
    }
}

/// Spawns a session room actor and returns a handle to it.
///
/// `participants` seeds the roster: just the host for a fresh session,
/// or the stored roster when resuming. Outbound channels always start
/// empty — connections attach through joins.
pub(crate) fn spawn_room<S: SessionStore>(
    session: Session,
    participants: HashMap<UserId, Participant>,
    store: Arc<S>,
    registry: Arc<Mutex<Registry>>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

    let next_seq = participants
        .values()
        .map(|p| p.joined_seq + 1)
        .max()
        .unwrap_or(0);

    // A resumed session keeps its original deadline: limit minus time
    // already spent. Overdue sessions get a deadline in the immediate
    // future and end on the actor's first loop turn.
    let deadline = session.settings.time_limit_minutes.and_then(|minutes| {
        let started = session.started_at?;
        let limit = Duration::from_secs(u64::from(minutes) * 60);
        let elapsed =
            (Utc::now() - started).to_std().unwrap_or_default();
        Some(tokio::time::Instant::now() + limit.saturating_sub(elapsed))
    });

    let room_code = session.room_code.clone();
    let actor = RoomActor {
        session,
        participants,
        senders: HashMap::new(),
        next_seq,
        store,
        registry,
        receiver: rx,
        deadline,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_code,
        sender: tx,
    }
}
