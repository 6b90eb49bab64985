//! Engine-facing operations behind `window.UnityGameAPI`.
//!
//! Every entry point returns a serialisable response; failures are reported in
//! the response body rather than raised to the engine.

use std::collections::BTreeMap;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{Backend, BackendError, LeaderboardEntry};
use crate::clock::Clock;
use crate::constants::DEFAULT_LEADERBOARD_LIMIT;
use crate::gate::{GateDecision, can_play};
use crate::level::{LevelRef, sanitise_level_id};
use crate::numbers::round_to_u32;
use crate::payload::{PayloadError, RawCompletionPayload, normalize_with};
use crate::progress::{AttemptRecord, ProgressSnapshot};
use crate::service::{ProgressService, telemetry_row};
use crate::session::{SessionCorrelator, resolve};
use crate::storage::{
    CachedIdentity, KeyValueStore, clear_replay_mode, mark_level_completed,
};

const LOG_TARGET: &str = "Unity Bridge";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("User not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Receives the progress-updated notification after a passing score is stored.
pub trait ProgressNotifier {
    fn progress_updated(&self);
}

impl ProgressNotifier for () {
    fn progress_updated(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelStartResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelCompleteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_proceed: Option<bool>,
}

impl LevelCompleteResponse {
    fn outcome(message: &str, score: f64, can_proceed: bool) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            error: None,
            score: Some(score),
            can_proceed: Some(can_proceed),
        }
    }

    fn failure(err: &BridgeError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(err.to_string()),
            score: None,
            can_proceed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub username: String,
    pub email: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayPermission {
    pub can_play: bool,
    pub reason: String,
}

impl From<GateDecision> for PlayPermission {
    fn from(decision: GateDecision) -> Self {
        Self {
            can_play: decision.allowed,
            reason: decision.reason.message().to_string(),
        }
    }
}

/// Progress in the shape `UnityGameData.getUserProgress` has always returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub completed_levels: Vec<u32>,
    pub completed_level_ids: Vec<String>,
    pub high_scores: BTreeMap<String, u32>,
    pub total_score: u64,
}

impl From<&ProgressSnapshot> for UserProgress {
    fn from(snapshot: &ProgressSnapshot) -> Self {
        Self {
            completed_levels: snapshot.completed_level_numbers.iter().copied().collect(),
            completed_level_ids: snapshot.completed_level_ids.iter().cloned().collect(),
            high_scores: snapshot.high_scores.clone(),
            total_score: snapshot.total_score,
        }
    }
}

pub struct GameBridge<B, L, T, C, N = ()> {
    progress: ProgressService<B, L, C>,
    sessions: SessionCorrelator<T>,
    notifier: N,
}

impl<B, L, T, C, N> GameBridge<B, L, T, C, N>
where
    B: Backend + Clone,
    L: KeyValueStore + Clone,
    T: KeyValueStore,
    C: Clock + Clone,
    N: ProgressNotifier,
{
    /// `tab_store` holds the active session context; the service's store holds everything else.
    pub const fn new(progress: ProgressService<B, L, C>, tab_store: T, notifier: N) -> Self {
        Self {
            progress,
            sessions: SessionCorrelator::new(tab_store),
            notifier,
        }
    }

    #[must_use]
    pub const fn progress(&self) -> &ProgressService<B, L, C> {
        &self.progress
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionCorrelator<T> {
        &self.sessions
    }

    /// `UnityGameAPI.onLevelStart`.
    pub fn on_level_start<'a>(
        &self,
        level: impl Into<LevelRef<'a>>,
        session_id: Option<&str>,
    ) -> LevelStartResponse {
        let user_id = CachedIdentity::load(self.progress.local()).user_id;
        let now = self.progress.clock().now();
        match self.sessions.on_start(level, session_id, user_id, now) {
            Ok(context) => {
                info!(
                    target: LOG_TARGET,
                    "Level started: {}, Session: {}", context.level_id, context.session_id
                );
                LevelStartResponse {
                    success: true,
                    message: "Level started".to_string(),
                    session_id: context.session_id,
                }
            }
            Err(err) => {
                error!(target: LOG_TARGET, "Failed to record level start: {err}");
                LevelStartResponse {
                    success: false,
                    message: err.to_string(),
                    session_id: session_id.unwrap_or_default().to_string(),
                }
            }
        }
    }

    /// `UnityGameAPI.onLevelComplete` for a JSON string payload.
    pub async fn on_level_complete_json(&self, json: &str) -> LevelCompleteResponse {
        info!(target: LOG_TARGET, "Level completed, data: {json}");
        match RawCompletionPayload::parse(json) {
            Ok(raw) => self.on_level_complete(&raw).await,
            Err(err) => {
                let err = BridgeError::from(err);
                error!(target: LOG_TARGET, "Error processing game completion: {err}");
                LevelCompleteResponse::failure(&err)
            }
        }
    }

    /// `UnityGameAPI.onLevelComplete` for an already-parsed payload.
    pub async fn on_level_complete(&self, raw: &RawCompletionPayload) -> LevelCompleteResponse {
        match self.complete(raw).await {
            Ok(response) => response,
            Err(err) => {
                error!(target: LOG_TARGET, "Error processing game completion: {err}");
                LevelCompleteResponse::failure(&err)
            }
        }
    }

    async fn complete(
        &self,
        raw: &RawCompletionPayload,
    ) -> Result<LevelCompleteResponse, BridgeError> {
        let record = normalize_with(raw, &self.progress.config().pass_policy());
        let user = self
            .progress
            .current_user()
            .await?
            .ok_or(BridgeError::NotAuthenticated)?;

        if record
            .user_id_from_payload
            .as_deref()
            .is_some_and(|payload_user| !payload_user.is_empty() && payload_user != user.id)
        {
            warn!(
                target: LOG_TARGET,
                "Session user does not match payload user ID. Proceeding with authenticated user."
            );
        }

        let now = self.progress.clock().now();
        let context = self.sessions.peek();
        let resolved = resolve(&record, context.as_ref(), now);

        let telemetry = telemetry_row(&user.id, &record, &resolved);
        if let Err(err) = self.progress.backend().insert_telemetry(&telemetry).await {
            error!(target: LOG_TARGET, "Error saving telemetry: {err}");
        }
        self.sessions.clear();

        if !record.passed {
            return Ok(LevelCompleteResponse::outcome(
                "Level failed - try again",
                record.final_score,
                false,
            ));
        }

        let row = AttemptRecord::new(
            user.id.as_str(),
            &record.level_id,
            round_to_u32(record.final_score),
            now,
        );
        self.progress.backend().insert_score(&row).await?;

        if let Some(level_number) = record.level_number {
            if let Err(err) = mark_level_completed(self.progress.local(), level_number) {
                warn!(target: LOG_TARGET, "Could not cache completion of level {level_number}: {err}");
            }
        }
        self.notifier.progress_updated();

        Ok(LevelCompleteResponse::outcome(
            "Level completed and saved",
            record.final_score,
            true,
        ))
    }

    /// `UnityGameAPI.getUserInfo`, answered from the local cache.
    #[must_use]
    pub fn get_user_info(&self) -> UserInfo {
        let identity = CachedIdentity::load(self.progress.local());
        UserInfo {
            username: identity.display_name().to_string(),
            email: identity.email.unwrap_or_default(),
            user_id: identity.user_id.unwrap_or_default(),
        }
    }

    /// Freshly aggregated progress, or `None` without a session. Read failures log and read as empty.
    async fn snapshot(&self) -> Option<ProgressSnapshot> {
        let user = match self.progress.current_user().await {
            Ok(user) => user?,
            Err(err) => {
                error!(target: LOG_TARGET, "Failed to read session: {err}");
                return None;
            }
        };
        match self.progress.snapshot_for(&user.id).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                error!(target: LOG_TARGET, "Error getting user progress: {err}");
                Some(ProgressSnapshot::empty(user.id, self.progress.total_levels()))
            }
        }
    }

    /// `UnityGameAPI.canPlayLevel`.
    pub async fn can_play_level<'a>(&self, level: impl Into<LevelRef<'a>>) -> PlayPermission {
        let level_id = sanitise_level_id(level);
        let snapshot = self.snapshot().await;
        can_play(&level_id, snapshot.as_ref()).into()
    }

    /// `UnityGameData.getUserProgress`.
    pub async fn get_user_progress(&self) -> UserProgress {
        self.snapshot()
            .await
            .map(|snapshot| UserProgress::from(&snapshot))
            .unwrap_or_default()
    }

    /// `UnityGameData.getLeaderboard`. Failures log and yield an empty board.
    pub async fn get_leaderboard(
        &self,
        level_id: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<LeaderboardEntry> {
        let limit = limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
        match self.progress.leaderboard(level_id, limit).await {
            Ok(entries) => entries,
            Err(err) => {
                error!(target: LOG_TARGET, "Error getting leaderboard: {err}");
                Vec::new()
            }
        }
    }

    /// `UnityGameAPI.returnToMap`: leaves replay mode and returns the map URL to navigate to.
    #[must_use]
    pub fn return_to_map(&self) -> String {
        if let Err(err) = clear_replay_mode(self.progress.local()) {
            warn!(target: LOG_TARGET, "Could not clear replay mode: {err}");
        }
        self.progress.config().map_url.clone()
    }
}
