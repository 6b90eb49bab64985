//! Correlation of a level start with its later completion.
//!
//! `on_level_start` leaves a small JSON blob in the tab-scoped store; the
//! matching completion reads and clears it to fill in timing and the session
//! id when the engine did not report them.

use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::{KEY_CURRENT_SESSION, SESSION_ID_PREFIX};
use crate::level::{LevelRef, sanitise_level_id};
use crate::payload::CanonicalCompletionRecord;
use crate::storage::{KeyValueStore, StorageError};

const LOG_TARGET: &str = "alverse::session";

/// Context recorded when a level starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub level_id: String,
    pub session_id: String,
    /// ISO-8601 start instant.
    pub start_time: String,
    pub user_id: Option<String>,
}

/// Timing and identity attached to a telemetry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSession {
    pub session_id: String,
    pub start_timestamp: String,
    pub end_timestamp: String,
}

/// `session_<unix millis>`.
#[must_use]
pub fn synthesise_session_id(now: DateTime<Utc>) -> String {
    format!("{SESSION_ID_PREFIX}{}", now.timestamp_millis())
}

/// ISO-8601 with millisecond precision, as the browser `toISOString` writes it.
#[must_use]
pub fn iso_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Reads and writes the active session context in a key/value store.
#[derive(Debug, Clone)]
pub struct SessionCorrelator<S> {
    store: S,
}

impl<S: KeyValueStore> SessionCorrelator<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Record the start of a level, replacing any previous context.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be written.
    pub fn on_start<'a>(
        &self,
        level: impl Into<LevelRef<'a>>,
        session_id: Option<&str>,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SessionContext, StorageError> {
        let context = SessionContext {
            level_id: sanitise_level_id(level),
            session_id: non_empty(session_id)
                .map_or_else(|| synthesise_session_id(now), str::to_string),
            start_time: iso_timestamp(now),
            user_id,
        };
        let blob = serde_json::to_string(&context)
            .map_err(|err| StorageError::Operation(err.to_string()))?;
        self.store.set(KEY_CURRENT_SESSION, &blob)?;
        Ok(context)
    }

    /// Current context without clearing it. Missing or corrupt blobs read as `None`.
    #[must_use]
    pub fn peek(&self) -> Option<SessionContext> {
        let blob = self.store.get(KEY_CURRENT_SESSION).ok().flatten()?;
        match serde_json::from_str(&blob) {
            Ok(context) => Some(context),
            Err(err) => {
                warn!(target: LOG_TARGET, "Ignoring unreadable session context: {err}");
                None
            }
        }
    }

    /// Read and clear the context.
    pub fn take(&self) -> Option<SessionContext> {
        let context = self.peek();
        self.clear();
        context
    }

    pub fn clear(&self) {
        if let Err(err) = self.store.remove(KEY_CURRENT_SESSION) {
            warn!(target: LOG_TARGET, "Failed to clear session context: {err}");
        }
    }
}

/// Fill timing and session id from the payload, then the start context, then `now`.
#[must_use]
pub fn resolve(
    record: &CanonicalCompletionRecord,
    context: Option<&SessionContext>,
    now: DateTime<Utc>,
) -> ResolvedSession {
    let now_iso = iso_timestamp(now);
    let start_timestamp = non_empty(record.start_timestamp.as_deref())
        .or_else(|| non_empty(context.map(|c| c.start_time.as_str())))
        .map_or_else(|| now_iso.clone(), str::to_string);
    let end_timestamp =
        non_empty(record.end_timestamp.as_deref()).map_or_else(|| now_iso.clone(), str::to_string);
    let session_id = non_empty(record.session_id.as_deref())
        .or_else(|| non_empty(context.map(|c| c.session_id.as_str())))
        .map_or_else(|| synthesise_session_id(now), str::to_string);

    ResolvedSession {
        session_id,
        start_timestamp,
        end_timestamp,
    }
}
