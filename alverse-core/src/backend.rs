//! Contract with the hosted auth and data service.
//!
//! The browser talks to a hosted service through [`Backend`]; the tester and
//! the test suites use [`MemoryBackend`]. Calls are single-threaded futures,
//! so the trait is `?Send`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::level::sanitise_level_id;
use crate::progress::AttemptRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("{table} request rejected: {message}")]
    Rejected { table: String, message: String },
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn rejected(table: &str, message: impl Into<String>) -> Self {
        Self::Rejected {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

/// Metadata attached to an auth user by the sign-up form or an OAuth provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub school_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: AuthUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub school_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    /// The service created the user but wants the address confirmed first.
    pub confirmation_pending: bool,
}

/// Row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub school_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Row of the `telemetry_sessions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub user_id: String,
    pub session_id: String,
    pub level_id: String,
    pub total_questions: f64,
    pub wrong_answers: f64,
    pub scene_runs: f64,
    pub time_zone_3d: f64,
    pub time_training_2d: f64,
    pub timestamp_start: String,
    pub timestamp_end: String,
    pub hint_used: bool,
    pub final_score: f64,
}

/// Score row joined with the player's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub level_id: String,
    pub score: u32,
    pub recorded_at: DateTime<Utc>,
    pub username: Option<String>,
    pub school_name: Option<String>,
}

/// Real-time notification of a new score row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreInserted {
    pub row: AttemptRecord,
}

#[async_trait(?Send)]
pub trait Backend {
    /// Live auth session, if any.
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn insert_score(&self, row: &AttemptRecord) -> Result<(), BackendError>;

    async fn insert_telemetry(&self, row: &TelemetryRow) -> Result<(), BackendError>;

    /// Every score row of a user, oldest first.
    async fn select_scores(&self, user_id: &str) -> Result<Vec<AttemptRecord>, BackendError>;

    async fn delete_scores(&self, user_id: &str) -> Result<(), BackendError>;

    async fn delete_telemetry(&self, user_id: &str) -> Result<(), BackendError>;

    async fn fetch_profile(&self, uid: &str) -> Result<Option<UserProfile>, BackendError>;

    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), BackendError>;

    /// Highest scores first, optionally for a single level.
    async fn leaderboard(
        &self,
        level_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, BackendError>;

    /// Stream of score inserts for one user. The stream ends when the backend drops it.
    fn subscribe_scores(&self, user_id: &str) -> mpsc::UnboundedReceiver<ScoreInserted>;
}

/// Writes [`MemoryBackend`] should refuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureInjection {
    pub scores: bool,
    pub telemetry: bool,
    pub profiles: bool,
    pub reads: bool,
    pub deletes: bool,
    pub sign_out: bool,
}

#[derive(Debug, Clone)]
struct Account {
    user: AuthUser,
    password: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    session: Option<AuthSession>,
    scores: Vec<AttemptRecord>,
    telemetry: Vec<TelemetryRow>,
    profiles: HashMap<String, UserProfile>,
    subscribers: Vec<(String, mpsc::UnboundedSender<ScoreInserted>)>,
    failures: FailureInjection,
    require_confirmation: bool,
    next_user: u64,
}

/// In-process backend. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account without a profile row and return its auth user.
    pub fn register(&self, email: &str, password: &str, metadata: UserMetadata) -> AuthUser {
        let mut state = self.state.borrow_mut();
        state.next_user += 1;
        let user = AuthUser {
            id: format!("user-{}", state.next_user),
            email: email.to_string(),
            user_metadata: metadata,
        };
        state.accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Start a session for a registered user without a password check.
    pub fn sign_in_as(&self, user: &AuthUser) {
        self.state.borrow_mut().session = Some(AuthSession { user: user.clone() });
    }

    /// Drop the live session, as an expired token would.
    pub fn expire_session(&self) {
        self.state.borrow_mut().session = None;
    }

    pub fn set_failures(&self, failures: FailureInjection) {
        self.state.borrow_mut().failures = failures;
    }

    pub fn require_email_confirmation(&self, required: bool) {
        self.state.borrow_mut().require_confirmation = required;
    }

    #[must_use]
    pub fn scores(&self) -> Vec<AttemptRecord> {
        self.state.borrow().scores.clone()
    }

    #[must_use]
    pub fn telemetry(&self) -> Vec<TelemetryRow> {
        self.state.borrow().telemetry.clone()
    }

    #[must_use]
    pub fn profile(&self, uid: &str) -> Option<UserProfile> {
        self.state.borrow().profiles.get(uid).cloned()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.borrow_mut();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.len()
    }

    fn check(&self, failing: bool, table: &str) -> Result<(), BackendError> {
        if failing {
            Err(BackendError::rejected(table, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn failures(&self) -> FailureInjection {
        self.state.borrow().failures
    }
}

#[async_trait(?Send)]
impl Backend for MemoryBackend {
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        Ok(self.state.borrow().session.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let mut state = self.state.borrow_mut();
        let account = state
            .accounts
            .get(email)
            .filter(|account| account.password == password)
            .ok_or(BackendError::InvalidCredentials)?;
        let session = AuthSession {
            user: account.user.clone(),
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, BackendError> {
        if self.state.borrow().accounts.contains_key(&request.email) {
            return Err(BackendError::AlreadyRegistered);
        }
        let metadata = UserMetadata {
            username: Some(request.username.clone()),
            school_name: request.school_name.clone(),
            ..UserMetadata::default()
        };
        let user = self.register(&request.email, &request.password, metadata);
        let confirmation_pending = self.state.borrow().require_confirmation;
        if !confirmation_pending {
            self.sign_in_as(&user);
        }
        Ok(SignUpOutcome {
            user,
            confirmation_pending,
        })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.check(self.failures().sign_out, "auth")?;
        self.state.borrow_mut().session = None;
        Ok(())
    }

    async fn insert_score(&self, row: &AttemptRecord) -> Result<(), BackendError> {
        self.check(self.failures().scores, "scores")?;
        let mut state = self.state.borrow_mut();
        state.scores.push(row.clone());
        let notice = ScoreInserted { row: row.clone() };
        state.subscribers.retain(|(user_id, tx)| {
            user_id != &row.user_id || tx.unbounded_send(notice.clone()).is_ok()
        });
        Ok(())
    }

    async fn insert_telemetry(&self, row: &TelemetryRow) -> Result<(), BackendError> {
        self.check(self.failures().telemetry, "telemetry_sessions")?;
        self.state.borrow_mut().telemetry.push(row.clone());
        Ok(())
    }

    async fn select_scores(&self, user_id: &str) -> Result<Vec<AttemptRecord>, BackendError> {
        self.check(self.failures().reads, "scores")?;
        let mut rows: Vec<AttemptRecord> = self
            .state
            .borrow()
            .scores
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.recorded_at);
        Ok(rows)
    }

    async fn delete_scores(&self, user_id: &str) -> Result<(), BackendError> {
        self.check(self.failures().deletes, "scores")?;
        self.state
            .borrow_mut()
            .scores
            .retain(|row| row.user_id != user_id);
        Ok(())
    }

    async fn delete_telemetry(&self, user_id: &str) -> Result<(), BackendError> {
        self.check(self.failures().deletes, "telemetry_sessions")?;
        self.state
            .borrow_mut()
            .telemetry
            .retain(|row| row.user_id != user_id);
        Ok(())
    }

    async fn fetch_profile(&self, uid: &str) -> Result<Option<UserProfile>, BackendError> {
        self.check(self.failures().reads, "users")?;
        Ok(self.profile(uid))
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), BackendError> {
        self.check(self.failures().profiles, "users")?;
        let mut state = self.state.borrow_mut();
        if state.profiles.contains_key(&profile.uid) {
            return Err(BackendError::rejected("users", "duplicate key value"));
        }
        state.profiles.insert(profile.uid.clone(), profile.clone());
        Ok(())
    }

    async fn leaderboard(
        &self,
        level_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, BackendError> {
        self.check(self.failures().reads, "scores")?;
        let level_id = level_id.map(sanitise_level_id);
        let state = self.state.borrow();
        let mut rows: Vec<&AttemptRecord> = state
            .scores
            .iter()
            .filter(|row| level_id.as_ref().is_none_or(|id| &row.level_id == id))
            .collect();
        rows.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.recorded_at.cmp(&b.recorded_at))
        });
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|row| {
                let profile = state.profiles.get(&row.user_id);
                LeaderboardEntry {
                    user_id: row.user_id.clone(),
                    level_id: row.level_id.clone(),
                    score: row.score,
                    recorded_at: row.recorded_at,
                    username: profile.map(|p| p.username.clone()),
                    school_name: profile.and_then(|p| p.school_name.clone()),
                }
            })
            .collect())
    }

    fn subscribe_scores(&self, user_id: &str) -> mpsc::UnboundedReceiver<ScoreInserted> {
        let (tx, rx) = mpsc::unbounded();
        self.state
            .borrow_mut()
            .subscribers
            .push((user_id.to_string(), tx));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures::StreamExt;
    use futures::executor::block_on;

    fn row(user: &str, level: &str, score: u32, offset_secs: i64) -> AttemptRecord {
        AttemptRecord::new(
            user,
            level,
            score,
            DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(offset_secs),
        )
    }

    #[test]
    fn sign_in_checks_password() {
        let backend = MemoryBackend::new();
        backend.register("ada@example.com", "pw", UserMetadata::default());
        let err = block_on(backend.sign_in("ada@example.com", "nope")).unwrap_err();
        assert_eq!(err, BackendError::InvalidCredentials);
        let session = block_on(backend.sign_in("ada@example.com", "pw")).unwrap();
        assert_eq!(session.user.email, "ada@example.com");
        assert!(block_on(backend.current_session()).unwrap().is_some());
    }

    #[test]
    fn select_scores_orders_by_time_and_filters_user() {
        let backend = MemoryBackend::new();
        block_on(async {
            backend.insert_score(&row("a", "2", 1, 20)).await.unwrap();
            backend.insert_score(&row("b", "1", 1, 5)).await.unwrap();
            backend.insert_score(&row("a", "1", 1, 10)).await.unwrap();
        });
        let rows = block_on(backend.select_scores("a")).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.level_id.as_str()).collect();
        assert_eq!(ids, vec!["level_1", "level_2"]);
    }

    #[test]
    fn injected_failures_reject_writes() {
        let backend = MemoryBackend::new();
        backend.set_failures(FailureInjection {
            scores: true,
            ..FailureInjection::default()
        });
        let err = block_on(backend.insert_score(&row("a", "1", 1, 0))).unwrap_err();
        assert!(matches!(err, BackendError::Rejected { .. }));
        assert!(backend.scores().is_empty());
    }

    #[test]
    fn leaderboard_sorts_descending_and_joins_profiles() {
        let backend = MemoryBackend::new();
        block_on(async {
            backend
                .insert_profile(&UserProfile {
                    uid: "a".into(),
                    username: "ada".into(),
                    email: "ada@example.com".into(),
                    school_name: Some("North".into()),
                    is_active: true,
                    created_at: DateTime::<Utc>::UNIX_EPOCH,
                })
                .await
                .unwrap();
            backend.insert_score(&row("a", "1", 10, 0)).await.unwrap();
            backend.insert_score(&row("b", "1", 30, 1)).await.unwrap();
            backend.insert_score(&row("a", "2", 50, 2)).await.unwrap();
        });
        let all = block_on(backend.leaderboard(None, 2)).unwrap();
        assert_eq!(all.iter().map(|e| e.score).collect::<Vec<_>>(), vec![50, 30]);
        assert_eq!(all[0].username.as_deref(), Some("ada"));
        assert_eq!(all[1].username, None);

        let level_one = block_on(backend.leaderboard(Some("1"), 10)).unwrap();
        assert_eq!(level_one.len(), 2);
        assert!(level_one.iter().all(|e| e.level_id == "level_1"));
    }

    #[test]
    fn subscribers_receive_their_own_inserts() {
        let backend = MemoryBackend::new();
        let mut rx = backend.subscribe_scores("a");
        block_on(async {
            backend.insert_score(&row("b", "1", 1, 0)).await.unwrap();
            backend.insert_score(&row("a", "3", 9, 1)).await.unwrap();
        });
        let notice = block_on(rx.next()).unwrap();
        assert_eq!(notice.row.level_id, "level_3");
        drop(rx);
        assert_eq!(backend.subscriber_count(), 0);
    }
}
