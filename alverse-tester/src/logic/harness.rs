use std::cell::Cell;
use std::rc::Rc;

use alverse_core::{
    AccountService, AlverseConfig, GameBridge, LevelCompleteResponse, ManualClock, MemoryBackend,
    MemoryStore, ProgressNotifier, ProgressService, ProgressSnapshot, SignUpForm,
};
use anyhow::{Context, Result, ensure};
use chrono::Duration;
use futures::executor::block_on;

/// Counts progress-updated notifications the way the map page would see them.
#[derive(Debug, Clone, Default)]
pub struct NotificationCounter {
    count: Rc<Cell<u32>>,
}

impl NotificationCounter {
    pub fn count(&self) -> u32 {
        self.count.get()
    }
}

impl ProgressNotifier for NotificationCounter {
    fn progress_updated(&self) {
        self.count.set(self.count.get().saturating_add(1));
    }
}

pub type HarnessBridge =
    GameBridge<MemoryBackend, MemoryStore, MemoryStore, ManualClock, NotificationCounter>;

/// One player's world: in-memory backend, browser stores and a bridge on top.
pub struct Harness {
    pub backend: MemoryBackend,
    pub local: MemoryStore,
    pub clock: ManualClock,
    pub notifications: NotificationCounter,
    pub bridge: HarnessBridge,
}

impl Harness {
    pub fn new(config: AlverseConfig) -> Self {
        let backend = MemoryBackend::new();
        let local = MemoryStore::new();
        let clock = ManualClock::default();
        let notifications = NotificationCounter::default();
        let service = ProgressService::new(backend.clone(), local.clone(), clock.clone(), config);
        let bridge = GameBridge::new(service, MemoryStore::new(), notifications.clone());
        Self {
            backend,
            local,
            clock,
            notifications,
            bridge,
        }
    }

    /// Fresh world with a confirmed, signed-in player.
    pub fn signed_in(config: AlverseConfig, username: &str) -> Result<Self> {
        let harness = Self::new(config);
        let accounts = AccountService::new(
            harness.backend.clone(),
            harness.local.clone(),
            harness.clock.clone(),
        );
        let report = block_on(accounts.sign_up(&SignUpForm {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            school_name: "Tester Academy".to_string(),
            password: "password".to_string(),
            password_confirm: "password".to_string(),
        }))
        .context("signing up the test player")?;
        ensure!(
            !report.confirmation_pending,
            "sign-up unexpectedly waits for confirmation"
        );
        Ok(harness)
    }

    pub fn service(&self) -> &ProgressService<MemoryBackend, MemoryStore, ManualClock> {
        self.bridge.progress()
    }

    pub fn total_levels(&self) -> u32 {
        self.service().total_levels()
    }

    /// Start `level`, let some play time pass and submit `payload`.
    pub fn play(&self, level: u32, payload: &str) -> Result<LevelCompleteResponse> {
        let started = self.bridge.on_level_start(level, None);
        ensure!(started.success, "level {level} did not start: {}", started.message);
        self.clock.advance(Duration::seconds(45));
        let response = block_on(self.bridge.on_level_complete_json(payload));
        ensure!(
            response.success,
            "level {level} completion failed: {}",
            response.error.as_deref().unwrap_or("no error given")
        );
        Ok(response)
    }

    /// Play `level` with a passing score of `score`.
    pub fn pass(&self, level: u32, score: u32) -> Result<()> {
        let payload = format!(r#"{{"levelID":{level},"score":{score},"passed":true}}"#);
        let response = self.play(level, &payload)?;
        ensure!(
            response.can_proceed == Some(true),
            "passing payload for level {level} did not pass"
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Result<ProgressSnapshot> {
        block_on(self.service().load_progress()).context("loading progress")
    }
}
