//! Session records: the data model that travels on the wire and into
//! the external store.
//!
//! These are the serializable shapes shared by all three consumers:
//! the real-time plane (inside [`ServerEvent`](crate::ServerEvent)
//! payloads), the control plane (HTTP handlers embedding the engine),
//! and the session store the engine persists through. One definition,
//! three uses — if the shapes drifted apart, a client that joined over
//! WebSocket would see a different session than one that fetched it
//! over HTTP.
//!
//! All field names are camelCase on the wire (JavaScript clients), all
//! timestamps are RFC 3339 UTC via `chrono`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoomCode, SessionId, UserId};

// ---------------------------------------------------------------------------
// SessionKind
// ---------------------------------------------------------------------------

/// What kind of activity a session hosts.
///
/// The engine treats every kind identically — joining, scoring, and
/// ending work the same way. The kind exists so clients can pick the
/// right UI and so listings can be filtered. Kebab-case on the wire:
/// `"study-group"`, not `"StudyGroup"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    /// Competitive quiz with live scoring.
    Quiz,
    /// Collaborative study group.
    StudyGroup,
    /// One-to-many lecture.
    Lecture,
    /// Case study discussion.
    CaseStudy,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quiz => write!(f, "quiz"),
            Self::StudyGroup => write!(f, "study-group"),
            Self::Lecture => write!(f, "lecture"),
            Self::CaseStudy => write!(f, "case-study"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

/// Per-session behavior toggles, chosen by the host at creation.
///
/// Every field has a default and `#[serde(default)]`, so a create
/// request can omit `settings` entirely (or any single field) and get
/// the standard behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Whether a participant who left or disconnected may come back in.
    /// When `false`, a lapsed participant's re-join is refused even
    /// though their record (and score) is kept.
    #[serde(default = "default_true")]
    pub allow_late_join: bool,

    /// Whether leaderboard updates are broadcast to the whole room.
    /// When `false` they are delivered to the host only; direct snapshot
    /// queries still work for everyone.
    #[serde(default = "default_true")]
    pub leaderboard_visible: bool,

    /// Optional wall-clock limit. When set, the session ends on its own
    /// `timeLimitMinutes` after it started, exactly as if the host had
    /// ended it.
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            allow_late_join: true,
            leaderboard_visible: true,
            time_limit_minutes: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The durable record of one collaborative session.
///
/// Invariants the engine maintains:
/// - `room_code` is unique among sessions with `is_active == true`.
/// - Once `is_active` flips to `false` the record never changes again;
///   `ended_at` is stamped at that moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Permanent identifier; what the store keys on.
    pub session_id: SessionId,
    /// Shareable join code, unique among active sessions.
    pub room_code: RoomCode,
    /// Activity kind (quiz, study-group, lecture, case-study).
    pub kind: SessionKind,
    /// The user who created the session. Only they may end it.
    pub host_user_id: UserId,
    /// Cap on simultaneously *active* participants.
    pub max_participants: usize,
    /// `true` until the session is ended (by host or time limit).
    pub is_active: bool,
    /// Behavior toggles chosen at creation.
    pub settings: SessionSettings,
    /// When the session became joinable.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session ended; `None` while active.
    pub ended_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One user's membership in one session.
///
/// A participant record is durable for the life of the session: leaving
/// or disconnecting flips `is_active` to `false` but keeps the record
/// (and its score) so a returning user resumes where they left off.
/// At most one record exists per `(session, user)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    /// Name shown to the room, resolved by the identity verifier.
    pub display_name: String,
    /// When this user was first admitted.
    pub joined_at: DateTime<Utc>,
    /// Admission order within the session. Timestamps can collide at
    /// millisecond resolution; this counter cannot, which makes
    /// leaderboard tie-breaks deterministic.
    pub joined_seq: u64,
    /// `true` while the user holds an admission slot.
    pub is_active: bool,
    /// Current score. Absolute value, set by `score.update`.
    pub score: u32,
}

// ---------------------------------------------------------------------------
// LeaderboardEntry
// ---------------------------------------------------------------------------

/// One row of a ranked leaderboard snapshot.
///
/// Snapshots are derived, never stored: sort the active participants by
/// score (descending), break ties by admission order (ascending), and
/// number the rows from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
}

// ---------------------------------------------------------------------------
// Snapshots and control-plane records
// ---------------------------------------------------------------------------

/// A point-in-time view of a full session: the record plus its
/// participants, ordered by admission.
///
/// This is what a joiner receives in `session.state`, what the control
/// plane returns from lookups, and what the engine hands to the
/// session store on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: Session,
    pub participants: Vec<Participant>,
}

/// A one-line summary for session listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub room_code: RoomCode,
    pub kind: SessionKind,
    pub host_user_id: UserId,
    /// Participants currently holding a slot.
    pub active_participants: usize,
    pub max_participants: usize,
    pub started_at: Option<DateTime<Utc>>,
}

/// Pagination parameters for listings. 1-based pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// One page of session summaries plus the paging bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
    pub page: usize,
    /// Total number of active sessions, across all pages.
    pub total: usize,
}

/// Body of a control-plane create call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub kind: SessionKind,
    pub max_participants: usize,
    #[serde(default)]
    pub settings: SessionSettings,
}

/// Success envelope for control-plane responses: `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

/// Error envelope for control-plane responses: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// =========================================================================
// Tests
// =========================================================================
