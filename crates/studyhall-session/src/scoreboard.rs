//! Leaderboard derivation.
//!
//! Standings are never stored — they are recomputed from the
//! participant roster on every change. Keeping one canonical sort here
//! means every caller (broadcasts, direct queries, the control plane)
//! sees identical rankings.

use std::collections::HashMap;

use studyhall_protocol::{LeaderboardEntry, Participant, UserId};

/// Ranks the active participants.
///
/// Sorted by score descending; ties go to whoever was admitted first
/// (lower `joined_seq`). Ranks are 1-based and dense — no rank sharing.
/// Inactive participants keep their scores but don't appear.
pub(crate) fn ranked(
    participants: &HashMap<UserId, Participant>,
) -> Vec<LeaderboardEntry> {
    let mut active: Vec<&Participant> =
        participants.values().filter(|p| p.is_active).collect();
    active.sort_by(|a, b| {
        b.score.cmp(&a.score).then(a.joined_seq.cmp(&b.joined_seq))
    });
    active
        .into_iter()
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: i + 1,
            user_id: p.user_id.clone(),
            display_name: p.display_name.clone(),
            score: p.score,
        })
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
