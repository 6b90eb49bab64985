//! Progress service used by the map page, the bridge and the tester.
//!
//! Writes are guarded by a busy flag so a second click while a request is in
//! flight is refused. Every reload takes a generation ticket; a reload that
//! finishes after a newer one started, or after a write landed, is discarded.

use std::cell::Cell;
use std::rc::Rc;

use futures::StreamExt;
use futures::channel::mpsc;
use futures::future::try_join;
use log::{debug, info, warn};
use thiserror::Error;

use crate::backend::{
    AuthUser, Backend, BackendError, LeaderboardEntry, ScoreInserted, TelemetryRow,
};
use crate::clock::Clock;
use crate::config::AlverseConfig;
use crate::level::level_id_for;
use crate::payload::CanonicalCompletionRecord;
use crate::progress::{AttemptRecord, ProgressSnapshot, aggregate};
use crate::session::ResolvedSession;
use crate::storage::{KeyValueStore, StorageError, clear_replay_mode};

const LOG_TARGET: &str = "alverse::service";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("User not authenticated")]
    NotAuthenticated,
    #[error("Another progress update is still running")]
    Busy,
    #[error("All levels are already completed")]
    AllLevelsCompleted,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Telemetry row for a completion, with the documented fallbacks for missing counters.
#[must_use]
pub fn telemetry_row(
    user_id: &str,
    record: &CanonicalCompletionRecord,
    session: &ResolvedSession,
) -> TelemetryRow {
    TelemetryRow {
        user_id: user_id.to_string(),
        session_id: session.session_id.clone(),
        level_id: record.level_id.clone(),
        total_questions: record.total_questions.unwrap_or(0.0),
        wrong_answers: record.wrong_answers.unwrap_or(0.0),
        scene_runs: record.scene_runs.unwrap_or(1.0),
        time_zone_3d: record.time_3d.unwrap_or(0.0),
        time_training_2d: record.time_2d.unwrap_or(0.0),
        timestamp_start: session.start_timestamp.clone(),
        timestamp_end: session.end_timestamp.clone(),
        hint_used: record.hint_used,
        final_score: record.final_score,
    }
}

/// Monotonic ticket counter; only the most recently issued ticket is current.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    latest: Rc<Cell<u64>>,
}

impl Generation {
    pub fn begin(&self) -> u64 {
        let ticket = self.latest.get().wrapping_add(1);
        self.latest.set(ticket);
        ticket
    }

    #[must_use]
    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.get() == ticket
    }
}

struct BusyGuard {
    flag: Rc<Cell<bool>>,
}

impl BusyGuard {
    fn acquire(flag: &Rc<Cell<bool>>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Self {
            flag: Rc::clone(flag),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Clones share the busy flag and generation counter.
#[derive(Clone)]
pub struct ProgressService<B, S, C> {
    backend: B,
    local: S,
    clock: C,
    config: AlverseConfig,
    busy: Rc<Cell<bool>>,
    generation: Generation,
}

impl<B, S, C> ProgressService<B, S, C>
where
    B: Backend + Clone,
    S: KeyValueStore + Clone,
    C: Clock + Clone,
{
    pub fn new(backend: B, local: S, clock: C, config: AlverseConfig) -> Self {
        Self {
            backend,
            local,
            clock,
            config,
            busy: Rc::new(Cell::new(false)),
            generation: Generation::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AlverseConfig {
        &self.config
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub const fn local(&self) -> &S {
        &self.local
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub fn total_levels(&self) -> u32 {
        self.config.total_levels()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    pub async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.backend.current_session().await?.map(|s| s.user))
    }

    /// # Errors
    ///
    /// Returns an error if the score rows cannot be read.
    pub async fn snapshot_for(&self, user_id: &str) -> Result<ProgressSnapshot, BackendError> {
        let rows = self.backend.select_scores(user_id).await?;
        debug!(target: LOG_TARGET, "Aggregating {} score rows for {user_id}", rows.len());
        Ok(aggregate(user_id, &rows, self.total_levels()))
    }

    /// Progress of the signed-in player; empty when nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or the score rows cannot be read.
    pub async fn load_progress(&self) -> Result<ProgressSnapshot, BackendError> {
        match self.current_user().await? {
            Some(user) => self.snapshot_for(&user.id).await,
            None => Ok(ProgressSnapshot::empty("", self.total_levels())),
        }
    }

    /// Reload under a fresh generation ticket. `None` means a newer reload superseded this one.
    ///
    /// # Errors
    ///
    /// Returns an error if progress cannot be loaded.
    pub async fn refresh(&self) -> Result<Option<ProgressSnapshot>, BackendError> {
        let ticket = self.generation.begin();
        let snapshot = self.load_progress().await?;
        if self.generation.is_current(ticket) {
            Ok(Some(snapshot))
        } else {
            debug!(target: LOG_TARGET, "Dropping stale progress generation {ticket}");
            Ok(None)
        }
    }

    /// Record a zero-score pass for the current level, as the map's next button does.
    ///
    /// # Errors
    ///
    /// Refused while another write is in flight, without a session, or once
    /// every level is complete; otherwise returns backend failures.
    pub async fn simulate_next(&self) -> Result<ProgressSnapshot, ServiceError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or(ServiceError::Busy)?;
        let user = self
            .current_user()
            .await?
            .ok_or(ServiceError::NotAuthenticated)?;
        let snapshot = self.snapshot_for(&user.id).await?;
        if snapshot.all_completed() {
            return Err(ServiceError::AllLevelsCompleted);
        }

        let level_id = level_id_for(snapshot.next_playable_level);
        let row = AttemptRecord::new(user.id.as_str(), &level_id, 0, self.clock.now());
        self.backend.insert_score(&row).await?;
        self.generation.begin();
        info!(target: LOG_TARGET, "Advanced {} past {level_id}", user.id);
        Ok(self.snapshot_for(&user.id).await?)
    }

    /// Delete every score and telemetry row of the player and leave replay mode.
    ///
    /// # Errors
    ///
    /// Refused while another write is in flight or without a session; otherwise
    /// returns the first backend or storage failure.
    pub async fn reset_progress(&self) -> Result<ProgressSnapshot, ServiceError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or(ServiceError::Busy)?;
        let user = self
            .current_user()
            .await?
            .ok_or(ServiceError::NotAuthenticated)?;
        try_join(
            self.backend.delete_scores(&user.id),
            self.backend.delete_telemetry(&user.id),
        )
        .await?;
        self.generation.begin();
        clear_replay_mode(&self.local)?;
        info!(target: LOG_TARGET, "Progress reset for {}", user.id);
        Ok(self.snapshot_for(&user.id).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the leaderboard cannot be read.
    pub async fn leaderboard(
        &self,
        level_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, BackendError> {
        self.backend.leaderboard(level_id, limit).await
    }

    /// Store a telemetry row for the signed-in player without touching scores.
    ///
    /// # Errors
    ///
    /// Returns an error without a session or if the insert is rejected.
    pub async fn save_telemetry(
        &self,
        record: &CanonicalCompletionRecord,
        session: &ResolvedSession,
    ) -> Result<TelemetryRow, ServiceError> {
        let user = self
            .current_user()
            .await?
            .ok_or(ServiceError::NotAuthenticated)?;
        let row = telemetry_row(&user.id, record, session);
        self.backend.insert_telemetry(&row).await?;
        Ok(row)
    }

    /// Follow score inserts for `user_id`, yielding a fresh snapshot after each burst.
    #[must_use]
    pub fn watch(&self, user_id: &str) -> ProgressWatch<B, S, C> {
        ProgressWatch {
            inserts: self.backend.subscribe_scores(user_id),
            service: self.clone(),
        }
    }
}

/// Stream of snapshots driven by score insert notifications.
pub struct ProgressWatch<B, S, C> {
    inserts: mpsc::UnboundedReceiver<ScoreInserted>,
    service: ProgressService<B, S, C>,
}

impl<B, S, C> ProgressWatch<B, S, C>
where
    B: Backend + Clone,
    S: KeyValueStore + Clone,
    C: Clock + Clone,
{
    /// Wait for the next insert and re-aggregate. Notifications already queued
    /// are folded into the same reload. Returns `None` once the feed closes.
    pub async fn next(&mut self) -> Option<ProgressSnapshot> {
        loop {
            let notice = self.inserts.next().await?;
            debug!(target: LOG_TARGET, "Score inserted for {}", notice.row.level_id);
            while let Ok(Some(_)) = self.inserts.try_next() {}

            match self.service.refresh().await {
                Ok(Some(snapshot)) => return Some(snapshot),
                Ok(None) => {}
                Err(err) => warn!(target: LOG_TARGET, "Progress refresh failed: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailureInjection, MemoryBackend, UserMetadata};
    use crate::clock::ManualClock;
    use crate::storage::{MemoryStore, replay_mode, set_replay_mode};
    use futures::executor::block_on;

    type Service = ProgressService<MemoryBackend, MemoryStore, ManualClock>;

    fn signed_in() -> (Service, MemoryBackend, MemoryStore, AuthUser) {
        let backend = MemoryBackend::new();
        let user = backend.register("ada@example.com", "pw", UserMetadata::default());
        backend.sign_in_as(&user);
        let store = MemoryStore::new();
        let service = ProgressService::new(
            backend.clone(),
            store.clone(),
            ManualClock::default(),
            AlverseConfig::default(),
        );
        (service, backend, store, user)
    }

    #[test]
    fn unauthenticated_progress_is_empty() {
        let service = ProgressService::new(
            MemoryBackend::new(),
            MemoryStore::new(),
            ManualClock::default(),
            AlverseConfig::default(),
        );
        let snapshot = block_on(service.load_progress()).unwrap();
        assert_eq!(snapshot.completed_count(), 0);
        assert_eq!(snapshot.next_playable_level, 1);
        assert!(matches!(
            block_on(service.simulate_next()),
            Err(ServiceError::NotAuthenticated)
        ));
    }

    #[test]
    fn simulate_next_walks_levels_and_stops_at_the_end() {
        let (service, backend, _, _) = signed_in();
        for expected_next in 2..=14 {
            let snapshot = block_on(service.simulate_next()).unwrap();
            assert_eq!(snapshot.next_playable_level, expected_next);
        }
        let snapshot = block_on(service.simulate_next()).unwrap();
        assert!(snapshot.all_completed());
        assert!(matches!(
            block_on(service.simulate_next()),
            Err(ServiceError::AllLevelsCompleted)
        ));
        assert_eq!(backend.scores().len(), 14);
        assert!(backend.scores().iter().all(|row| row.score == 0));
    }

    #[test]
    fn busy_flag_refuses_overlapping_writes() {
        let (service, backend, _, _) = signed_in();
        let guard = BusyGuard::acquire(&service.busy).unwrap();
        assert!(service.is_busy());
        assert!(matches!(
            block_on(service.simulate_next()),
            Err(ServiceError::Busy)
        ));
        drop(guard);
        assert!(!service.is_busy());
        block_on(service.simulate_next()).unwrap();
        assert_eq!(backend.scores().len(), 1);
        assert!(!service.is_busy());
    }

    #[test]
    fn reset_clears_rows_and_replay_flag() {
        let (service, backend, store, _) = signed_in();
        block_on(service.simulate_next()).unwrap();
        set_replay_mode(&store).unwrap();
        let snapshot = block_on(service.reset_progress()).unwrap();
        assert_eq!(snapshot.completed_count(), 0);
        assert!(backend.scores().is_empty());
        assert!(!replay_mode(&store));
    }

    #[test]
    fn failed_reset_releases_busy_flag() {
        let (service, backend, _, _) = signed_in();
        backend.set_failures(FailureInjection {
            deletes: true,
            ..FailureInjection::default()
        });
        assert!(matches!(
            block_on(service.reset_progress()),
            Err(ServiceError::Backend(_))
        ));
        assert!(!service.is_busy());
    }

    #[test]
    fn watch_coalesces_queued_inserts() {
        let (service, backend, _, user) = signed_in();
        let mut watch = service.watch(&user.id);
        block_on(async {
            for level in ["1", "2", "3"] {
                let row = AttemptRecord::new(user.id.as_str(), level, 5, ManualClock::default().now());
                backend.insert_score(&row).await.unwrap();
            }
        });
        let snapshot = block_on(watch.next()).unwrap();
        assert_eq!(snapshot.completed_count(), 3);
        assert_eq!(snapshot.next_playable_level, 4);
    }

    #[test]
    fn only_latest_generation_is_current() {
        let generation = Generation::default();
        let first = generation.begin();
        let shared = generation.clone();
        let second = shared.begin();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }

    /// Yields once so a concurrently joined future can run in between.
    struct YieldOnce(bool);

    impl std::future::Future for YieldOnce {
        type Output = ();

        fn poll(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<()> {
            if self.0 {
                std::task::Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                std::task::Poll::Pending
            }
        }
    }

    /// Memory backend whose score reads stall after reading the rows.
    #[derive(Clone)]
    struct StallingReads(MemoryBackend);

    #[async_trait::async_trait(?Send)]
    impl Backend for StallingReads {
        async fn current_session(&self) -> Result<Option<crate::backend::AuthSession>, BackendError> {
            self.0.current_session().await
        }

        async fn sign_in(&self, email: &str, password: &str) -> Result<crate::backend::AuthSession, BackendError> {
            self.0.sign_in(email, password).await
        }

        async fn sign_up(
            &self,
            request: &crate::backend::SignUpRequest,
        ) -> Result<crate::backend::SignUpOutcome, BackendError> {
            self.0.sign_up(request).await
        }

        async fn sign_out(&self) -> Result<(), BackendError> {
            self.0.sign_out().await
        }

        async fn insert_score(&self, row: &AttemptRecord) -> Result<(), BackendError> {
            self.0.insert_score(row).await
        }

        async fn insert_telemetry(&self, row: &TelemetryRow) -> Result<(), BackendError> {
            self.0.insert_telemetry(row).await
        }

        async fn select_scores(&self, user_id: &str) -> Result<Vec<AttemptRecord>, BackendError> {
            let rows = self.0.select_scores(user_id).await;
            YieldOnce(false).await;
            rows
        }

        async fn delete_scores(&self, user_id: &str) -> Result<(), BackendError> {
            self.0.delete_scores(user_id).await
        }

        async fn delete_telemetry(&self, user_id: &str) -> Result<(), BackendError> {
            self.0.delete_telemetry(user_id).await
        }

        async fn fetch_profile(&self, uid: &str) -> Result<Option<crate::backend::UserProfile>, BackendError> {
            self.0.fetch_profile(uid).await
        }

        async fn insert_profile(&self, profile: &crate::backend::UserProfile) -> Result<(), BackendError> {
            self.0.insert_profile(profile).await
        }

        async fn leaderboard(
            &self,
            level_id: Option<&str>,
            limit: usize,
        ) -> Result<Vec<LeaderboardEntry>, BackendError> {
            self.0.leaderboard(level_id, limit).await
        }

        fn subscribe_scores(&self, user_id: &str) -> mpsc::UnboundedReceiver<ScoreInserted> {
            self.0.subscribe_scores(user_id)
        }
    }

    #[test]
    fn refresh_started_before_reset_is_dropped() {
        let (_, backend, store, _) = signed_in();
        let service = ProgressService::new(
            StallingReads(backend.clone()),
            store,
            ManualClock::default(),
            AlverseConfig::default(),
        );
        block_on(service.simulate_next()).unwrap();
        block_on(service.simulate_next()).unwrap();

        let (refreshed, reset) = block_on(futures::future::join(
            service.refresh(),
            service.reset_progress(),
        ));
        assert_eq!(reset.unwrap().completed_count(), 0);
        assert!(refreshed.unwrap().is_none());
        assert!(backend.scores().is_empty());
    }

    #[test]
    fn refresh_overlapping_simulate_next_is_dropped() {
        let (_, backend, store, _) = signed_in();
        let service = ProgressService::new(
            StallingReads(backend),
            store,
            ManualClock::default(),
            AlverseConfig::default(),
        );
        let (advanced, refreshed) = block_on(futures::future::join(
            service.simulate_next(),
            service.refresh(),
        ));
        assert_eq!(advanced.unwrap().completed_count(), 1);
        assert!(refreshed.unwrap().is_none());
        assert_eq!(
            block_on(service.refresh()).unwrap().map(|s| s.completed_count()),
            Some(1)
        );
    }

    #[test]
    fn refresh_returns_snapshot_when_uncontended() {
        let (service, _, _, _) = signed_in();
        let snapshot = block_on(service.refresh()).unwrap();
        assert_eq!(snapshot.map(|s| s.next_playable_level), Some(1));
    }
}
