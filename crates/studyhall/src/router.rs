//! Personal-channel event delivery.
//!
//! Room-scoped fan-out lives with the room itself — each room knows its
//! participants' event channels and broadcasts in event order. What
//! rooms can't do is reach a *user*: account-scoped notifications
//! (an achievement, an experience-point award, a kick from a session
//! they have in another tab) need to find every connection a user
//! currently holds, whatever rooms those connections are in.
//!
//! The `Router` is that lookup: user id → live event channels. The
//! connection handler registers each connection after authentication
//! and deregisters it on disconnect; in between, anyone holding the
//! router can push events to a user.

use std::collections::HashMap;

use studyhall_protocol::{ServerEvent, UserId};
use studyhall_session::EventSender;
use studyhall_transport::ConnectionId;
use tokio::sync::Mutex;

/// Delivers events to all of a user's live connections.
///
/// Cheap to share: the engine hands out `Arc<Router>` clones so the
/// embedding application can push notifications while the engine runs.
#[derive(Default)]
pub struct Router {
    conns: Mutex<HashMap<UserId, HashMap<ConnectionId, EventSender>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a user's delivery set.
    pub(crate) async fn register(
        &self,
        user_id: &UserId,
        conn_id: ConnectionId,
        sender: EventSender,
    ) {
        self.conns
            .lock()
            .await
            .entry(user_id.clone())
            .or_default()
            .insert(conn_id, sender);
    }

    /// Removes a connection from a user's delivery set.
    ///
    /// Removing a connection that was never registered (or was already
    /// removed) is a no-op.
    pub(crate) async fn deregister(
        &self,
        user_id: &UserId,
        conn_id: ConnectionId,
    ) {
        let mut conns = self.conns.lock().await;
        if let Some(senders) = conns.get_mut(user_id) {
            senders.remove(&conn_id);
            if senders.is_empty() {
                conns.remove(user_id);
            }
        }
    }

    /// The ids of every live connection a user holds.
    pub(crate) async fn connections_of(
        &self,
        user_id: &UserId,
    ) -> Vec<ConnectionId> {
        self.conns
            .lock()
            .await
            .get(user_id)
            .map(|senders| senders.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Sends an event to every connection a user currently holds.
    ///
    /// Returns how many connections the event was queued to. Channels
    /// whose connection died mid-flight are skipped; the handler's
    /// cleanup will deregister them shortly.
    pub async fn to_user(&self, user_id: &UserId, event: ServerEvent) -> usize {
        let conns = self.conns.lock().await;
        let Some(senders) = conns.get(user_id) else {
            return 0;
        };
        senders
            .values()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }

    /// Sends a `notification` event to a user.
    ///
    /// This is the account-scoped channel from the embedding
    /// application's side: name the notification and attach whatever
    /// payload the client expects.
    ///
    /// ```rust,no_run
    /// # use studyhall::Router;
    /// # use studyhall_protocol::UserId;
    /// # async fn demo(router: &Router) {
    /// router
    ///     .notify(&UserId::from("u-7"), "xp.award", serde_json::json!({
    ///         "amount": 50,
    ///         "reason": "quiz completed",
    ///     }))
    ///     .await;
    /// # }
    /// ```
    pub async fn notify(
        &self,
        user_id: &UserId,
        event: impl Into<String>,
        data: serde_json::Value,
    ) -> usize {
        self.to_user(
            user_id,
            ServerEvent::Notification {
                event: event.into(),
                data,
            },
        )
        .await
    }
}

// =========================================================================
// Tests
// =========================================================================
