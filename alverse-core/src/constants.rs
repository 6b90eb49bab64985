//! Shared constants for level ids, pass thresholds and storage keys.

/// Prefix of every canonical level id (`level_<n>`).
pub const LEVEL_ID_PREFIX: &str = "level_";

/// Number of levels on the map when no configuration overrides it.
pub const DEFAULT_TOTAL_LEVELS: u32 = 14;

/// Wrong answers tolerated when the payload carries no question count.
pub const DEFAULT_ALLOWED_WRONG_ANSWERS: u32 = 2;

/// Fraction of the question count that may be answered wrongly.
pub const WRONG_ANSWER_RATIO: f64 = 0.25;

/// Prefix of synthesised session identifiers.
pub const SESSION_ID_PREFIX: &str = "session_";

/// Browser event dispatched after a passing score is written.
pub const PROGRESS_UPDATED_EVENT: &str = "alvverse:progress-updated";

// Local key/value storage keys.
pub const KEY_USER_EMAIL: &str = "userEmail";
pub const KEY_USER_ID: &str = "userId";
pub const KEY_USERNAME: &str = "username";
pub const KEY_REPLAY_MODE: &str = "replayMode";
pub const KEY_CURRENT_SESSION: &str = "currentGameSession";

/// Rows returned by a leaderboard query when no limit is given.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

/// Username shown when nothing is cached.
pub const DEFAULT_USERNAME: &str = "Player";

/// Storage key marking level `n` as completed for immediate UI feedback.
#[must_use]
pub fn level_completed_key(level_number: u32) -> String {
    format!("level{level_number}Completed")
}
