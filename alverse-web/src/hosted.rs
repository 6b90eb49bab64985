//! [`Backend`] over the hosted auth and data service.
//!
//! The page installs a thin JavaScript adapter around the service client as
//! `window.AlverseBackend`. Every method returns a promise that resolves with
//! plain data and rejects with an `Error` or a `{ message }` record:
//!
//! | method                                   | resolves with                         |
//! |------------------------------------------|---------------------------------------|
//! | `getSession()`                           | `{ user }` or `null`                  |
//! | `signInWithPassword(email, password)`    | `{ user }`                            |
//! | `signUp({ email, password, username, school_name })` | `{ user, session }`      |
//! | `signOut()`                              | anything                              |
//! | `insert(table, row)`                     | anything                              |
//! | `selectScores(table, userId)`            | score rows, oldest first              |
//! | `deleteWhereUser(table, userId)`         | anything                              |
//! | `fetchProfile(table, uid)`               | profile row or `null`                 |
//! | `leaderboard(scores, users, levelId, limit)` | score rows with a `users` join    |
//! | `subscribeScores(table, userId, callback)` | nothing; `callback(row)` per insert |

use std::rc::Rc;

use alverse_core::level::LevelRef;
use alverse_core::numbers::round_to_u32;
use alverse_core::payload::to_number;
use alverse_core::{
    AlverseConfig, AttemptRecord, AuthSession, AuthUser, Backend, BackendError, LeaderboardEntry,
    ScoreInserted, SignUpOutcome, SignUpRequest, TelemetryRow, UserProfile, sanitise_level_id,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::channel::mpsc;
use js_sys::{Function, Promise};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::dom;

/// `window` property holding the adapter.
pub const ADAPTER_GLOBAL: &str = "AlverseBackend";

const AUTH: &str = "auth";

#[wasm_bindgen]
extern "C" {
    #[derive(Debug, Clone)]
    pub type BackendAdapter;

    #[wasm_bindgen(method, catch, js_name = getSession)]
    fn get_session(this: &BackendAdapter) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = signInWithPassword)]
    fn sign_in_with_password(
        this: &BackendAdapter,
        email: &str,
        password: &str,
    ) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = signUp)]
    fn sign_up(this: &BackendAdapter, request: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = signOut)]
    fn sign_out(this: &BackendAdapter) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn insert(this: &BackendAdapter, table: &str, row: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = selectScores)]
    fn select_scores(this: &BackendAdapter, table: &str, user_id: &str)
    -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = deleteWhereUser)]
    fn delete_where_user(
        this: &BackendAdapter,
        table: &str,
        user_id: &str,
    ) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = fetchProfile)]
    fn fetch_profile(this: &BackendAdapter, table: &str, uid: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn leaderboard(
        this: &BackendAdapter,
        scores_table: &str,
        users_table: &str,
        level_id: Option<String>,
        limit: u32,
    ) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = subscribeScores)]
    fn subscribe_scores(
        this: &BackendAdapter,
        table: &str,
        user_id: &str,
        callback: &Function,
    ) -> Result<JsValue, JsValue>;
}

#[derive(Debug, Error)]
pub enum HostedError {
    #[error("window.AlverseBackend is not installed")]
    MissingAdapter,
}

/// Map a service error message onto the core taxonomy.
#[must_use]
pub fn classify_error(table: &str, message: &str) -> BackendError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid login credentials") {
        BackendError::InvalidCredentials
    } else if lower.contains("already registered") {
        BackendError::AlreadyRegistered
    } else if lower.contains("failed to fetch") || lower.contains("networkerror") {
        BackendError::Unavailable(message.to_string())
    } else {
        BackendError::rejected(table, message)
    }
}

/// Score row as the service returns it; scores and level ids may arrive as text.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreRow {
    pub user_id: String,
    #[serde(default)]
    pub level_id: Value,
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub recorded_at: Value,
}

/// Row timestamp in any of the shapes the service emits. Timestamps without an
/// offset are taken as UTC.
#[must_use]
pub fn parse_recorded_at(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.with_timezone(&Utc));
    }
    if let Ok(stamp) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(stamp.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

impl ScoreRow {
    /// Canonical record. Rows without a usable level id keep an empty id and
    /// are ignored by aggregation.
    #[must_use]
    pub fn into_record(self, fallback_time: DateTime<Utc>) -> AttemptRecord {
        let level_id = match &self.level_id {
            Value::String(_) | Value::Number(_) => sanitise_level_id(LevelRef::from(&self.level_id)),
            _ => String::new(),
        };
        let score = to_number(&self.score).map_or(0, round_to_u32);
        AttemptRecord::new(
            self.user_id,
            &level_id,
            score,
            parse_recorded_at(&self.recorded_at).unwrap_or(fallback_time),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProfileJoin {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    school_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardRow {
    #[serde(flatten)]
    row: ScoreRow,
    #[serde(default)]
    users: Option<ProfileJoin>,
}

impl LeaderboardRow {
    #[must_use]
    pub fn into_entry(self, fallback_time: DateTime<Utc>) -> LeaderboardEntry {
        let profile = self.users.unwrap_or_default();
        let record = self.row.into_record(fallback_time);
        LeaderboardEntry {
            user_id: record.user_id,
            level_id: record.level_id,
            score: record.score,
            recorded_at: record.recorded_at,
            username: profile.username,
            school_name: profile.school_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignUpReply {
    user: AuthUser,
    #[serde(default)]
    session: Option<Value>,
}

impl From<SignUpReply> for SignUpOutcome {
    fn from(reply: SignUpReply) -> Self {
        Self {
            user: reply.user,
            confirmation_pending: reply.session.is_none(),
        }
    }
}

/// Decode through `serde_json::Value` so rows decode the same way natively.
fn decode<T: DeserializeOwned>(value: JsValue) -> Result<T, BackendError> {
    let json: Value =
        serde_wasm_bindgen::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| BackendError::Decode(e.to_string()))
}

fn encode<T: Serialize>(row: &T) -> Result<JsValue, BackendError> {
    row.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| BackendError::Decode(e.to_string()))
}

async fn settle(table: &str, call: Result<Promise, JsValue>) -> Result<JsValue, BackendError> {
    let promise = call.map_err(|err| classify_error(table, &dom::js_error_message(&err)))?;
    JsFuture::from(promise)
        .await
        .map_err(|err| classify_error(table, &dom::js_error_message(&err)))
}

#[derive(Debug)]
struct Tables {
    scores: String,
    telemetry: String,
    users: String,
}

#[derive(Debug, Clone)]
pub struct HostedBackend {
    adapter: BackendAdapter,
    tables: Rc<Tables>,
}

impl HostedBackend {
    #[must_use]
    pub fn new(adapter: BackendAdapter, config: &AlverseConfig) -> Self {
        Self {
            adapter,
            tables: Rc::new(Tables {
                scores: config.scores_table.clone(),
                telemetry: config.telemetry_table.clone(),
                users: config.users_table.clone(),
            }),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the page did not install the adapter.
    pub fn from_window(config: &AlverseConfig) -> Result<Self, HostedError> {
        let adapter = dom::global(ADAPTER_GLOBAL).ok_or(HostedError::MissingAdapter)?;
        Ok(Self::new(adapter.unchecked_into(), config))
    }
}

#[async_trait(?Send)]
impl Backend for HostedBackend {
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        decode(settle(AUTH, self.adapter.get_session()).await?)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        decode(settle(AUTH, self.adapter.sign_in_with_password(email, password)).await?)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, BackendError> {
        let reply: SignUpReply =
            decode(settle(AUTH, self.adapter.sign_up(encode(request)?)).await?)?;
        Ok(reply.into())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        settle(AUTH, self.adapter.sign_out()).await.map(drop)
    }

    async fn insert_score(&self, row: &AttemptRecord) -> Result<(), BackendError> {
        let table = &self.tables.scores;
        settle(table, self.adapter.insert(table, encode(row)?))
            .await
            .map(drop)
    }

    async fn insert_telemetry(&self, row: &TelemetryRow) -> Result<(), BackendError> {
        let table = &self.tables.telemetry;
        settle(table, self.adapter.insert(table, encode(row)?))
            .await
            .map(drop)
    }

    async fn select_scores(&self, user_id: &str) -> Result<Vec<AttemptRecord>, BackendError> {
        let table = &self.tables.scores;
        let rows: Option<Vec<ScoreRow>> =
            decode(settle(table, self.adapter.select_scores(table, user_id)).await?)?;
        let now = Utc::now();
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_record(now))
            .collect())
    }

    async fn delete_scores(&self, user_id: &str) -> Result<(), BackendError> {
        let table = &self.tables.scores;
        settle(table, self.adapter.delete_where_user(table, user_id))
            .await
            .map(drop)
    }

    async fn delete_telemetry(&self, user_id: &str) -> Result<(), BackendError> {
        let table = &self.tables.telemetry;
        settle(table, self.adapter.delete_where_user(table, user_id))
            .await
            .map(drop)
    }

    async fn fetch_profile(&self, uid: &str) -> Result<Option<UserProfile>, BackendError> {
        let table = &self.tables.users;
        decode(settle(table, self.adapter.fetch_profile(table, uid)).await?)
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), BackendError> {
        let table = &self.tables.users;
        settle(table, self.adapter.insert(table, encode(profile)?))
            .await
            .map(drop)
    }

    async fn leaderboard(
        &self,
        level_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, BackendError> {
        let tables = &self.tables;
        let call = self.adapter.leaderboard(
            &tables.scores,
            &tables.users,
            level_id.map(sanitise_level_id),
            u32::try_from(limit).unwrap_or(u32::MAX),
        );
        let rows: Option<Vec<LeaderboardRow>> = decode(settle(&tables.scores, call).await?)?;
        let now = Utc::now();
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_entry(now))
            .collect())
    }

    fn subscribe_scores(&self, user_id: &str) -> mpsc::UnboundedReceiver<ScoreInserted> {
        let (tx, rx) = mpsc::unbounded();
        let on_insert = Closure::<dyn FnMut(JsValue)>::new(move |payload: JsValue| {
            match decode::<ScoreRow>(payload) {
                Ok(row) => {
                    let _ = tx.unbounded_send(ScoreInserted {
                        row: row.into_record(Utc::now()),
                    });
                }
                Err(err) => log::warn!("Ignoring malformed score notification: {err}"),
            }
        });
        match self
            .adapter
            .subscribe_scores(&self.tables.scores, user_id, on_insert.as_ref().unchecked_ref())
        {
            // The adapter keeps calling back for the page lifetime.
            Ok(_) => on_insert.forget(),
            Err(err) => log::error!(
                "Could not subscribe to score inserts: {}",
                dom::js_error_message(&err)
            ),
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn service_messages_map_onto_backend_errors() {
        assert_eq!(
            classify_error(AUTH, "Invalid login credentials"),
            BackendError::InvalidCredentials
        );
        assert_eq!(
            classify_error(AUTH, "User already registered"),
            BackendError::AlreadyRegistered
        );
        assert!(matches!(
            classify_error("scores", "TypeError: Failed to fetch"),
            BackendError::Unavailable(_)
        ));
        assert_eq!(
            classify_error("scores", "new row violates row-level security policy"),
            BackendError::rejected("scores", "new row violates row-level security policy")
        );
    }

    #[test]
    fn score_rows_coerce_text_fields() {
        let row: ScoreRow = serde_json::from_value(json!({
            "user_id": "u1",
            "level_id": "4",
            "score": "12.6",
            "recorded_at": "2024-05-01T10:00:00.123456+00:00"
        }))
        .unwrap();
        let record = row.into_record(at(0));
        assert_eq!(record.level_id, "level_4");
        assert_eq!(record.score, 13);
        assert_eq!(record.recorded_at.timestamp(), 1_714_557_600);
    }

    #[test]
    fn score_rows_accept_timestamps_without_offset() {
        let rows: Vec<ScoreRow> = serde_json::from_value(json!([
            { "user_id": "u1", "level_id": 1, "score": 3, "recorded_at": "2024-05-01T10:00:00" },
            { "user_id": "u1", "level_id": 2, "score": 4, "recorded_at": "2024-05-01 10:00:00.5+00" },
            { "user_id": "u1", "level_id": 3, "score": 5, "recorded_at": "yesterday" }
        ]))
        .unwrap();
        let records: Vec<_> = rows.into_iter().map(|row| row.into_record(at(7))).collect();
        assert_eq!(records[0].recorded_at.timestamp(), 1_714_557_600);
        assert_eq!(records[1].recorded_at.timestamp(), 1_714_557_600);
        assert_eq!(records[2].recorded_at, at(7));
    }

    #[test]
    fn score_rows_without_level_are_left_unusable() {
        let row: ScoreRow = serde_json::from_value(json!({ "user_id": "u1" })).unwrap();
        let record = row.into_record(at(5));
        assert_eq!(record.level_id, "");
        assert_eq!(record.score, 0);
        assert_eq!(record.recorded_at, at(5));
    }

    #[test]
    fn leaderboard_rows_carry_joined_profile() {
        let row: LeaderboardRow = serde_json::from_value(json!({
            "user_id": "u1",
            "level_id": "level_2",
            "score": 90,
            "users": { "username": "ada", "school_name": "North High" }
        }))
        .unwrap();
        let entry = row.into_entry(at(0));
        assert_eq!(entry.score, 90);
        assert_eq!(entry.username.as_deref(), Some("ada"));
        assert_eq!(entry.school_name.as_deref(), Some("North High"));

        let bare: LeaderboardRow =
            serde_json::from_value(json!({ "user_id": "u2", "level_id": 3, "score": 1 })).unwrap();
        assert_eq!(bare.into_entry(at(0)).username, None);
    }

    #[test]
    fn sign_up_without_session_awaits_confirmation() {
        let user = json!({ "id": "u1", "email": "a@b.c" });
        let pending: SignUpReply =
            serde_json::from_value(json!({ "user": user, "session": null })).unwrap();
        assert!(SignUpOutcome::from(pending).confirmation_pending);
        let live: SignUpReply =
            serde_json::from_value(json!({ "user": user, "session": { "user": user } })).unwrap();
        assert!(!SignUpOutcome::from(live).confirmation_pending);
    }
}
