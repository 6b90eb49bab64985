//! Level gating: who may start which level.
//!
//! Levels are played once, in order. Replays unlock only after every level has
//! a passing attempt.

use serde::{Deserialize, Serialize};

use crate::level::sanitise_level_id;
use crate::progress::ProgressSnapshot;

/// Why a play request was allowed or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    NotAuthenticated,
    ReplayLocked,
    ReplayMode,
    FirstTimePlay,
}

impl GateReason {
    /// Message returned to the engine.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "User not authenticated",
            Self::ReplayLocked => {
                "Level already completed. Finish all levels to unlock replay mode."
            }
            Self::ReplayMode => "Replay mode active",
            Self::FirstTimePlay => "First time play",
        }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of a play request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: GateReason,
}

impl GateDecision {
    const fn allow(reason: GateReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    const fn deny(reason: GateReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Decide whether `level_id` may be played.
///
/// `snapshot` is `None` when there is no authenticated user.
#[must_use]
pub fn can_play(level_id: &str, snapshot: Option<&ProgressSnapshot>) -> GateDecision {
    let Some(snapshot) = snapshot else {
        return GateDecision::deny(GateReason::NotAuthenticated);
    };

    let level_id = sanitise_level_id(level_id);
    let all_completed = snapshot.all_completed();
    if snapshot.has_completed(&level_id) && !all_completed {
        return GateDecision::deny(GateReason::ReplayLocked);
    }

    if all_completed {
        GateDecision::allow(GateReason::ReplayMode)
    } else {
        GateDecision::allow(GateReason::FirstTimePlay)
    }
}

/// Whether the map lets the player open `level_number`.
///
/// Only the current unlocked level may be started, once. After every level is
/// complete any completed level may be replayed.
#[must_use]
pub fn can_open_from_map(level_number: u32, snapshot: &ProgressSnapshot) -> bool {
    let completed = snapshot.is_completed(level_number);
    let first_play = level_number == snapshot.next_playable_level && !completed;
    let replay = snapshot.all_completed() && completed;
    first_play || replay
}
