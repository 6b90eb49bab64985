//! Alverse progression core
//!
//! Platform-agnostic level progression for the Alverse learning game: engine
//! payload normalisation, pass/fail evaluation, progress aggregation, level
//! gating and the services the browser bridge and the tester build on.
//! This crate has no browser dependencies; storage and the hosted service are
//! reached through the [`KeyValueStore`] and [`Backend`] traits.

pub mod account;
pub mod backend;
pub mod bridge;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod constants;
pub mod evaluate;
pub mod gate;
pub mod level;
pub mod map;
pub mod numbers;
pub mod payload;
pub mod progress;
pub mod service;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use account::{AccountError, AccountService, SignUpForm, SignUpReport, oauth_username};
pub use backend::{
    AuthSession, AuthUser, Backend, BackendError, FailureInjection, LeaderboardEntry,
    MemoryBackend, ScoreInserted, SignUpOutcome, SignUpRequest, TelemetryRow, UserMetadata,
    UserProfile,
};
pub use bridge::{
    BridgeError, GameBridge, LevelCompleteResponse, LevelStartResponse, PlayPermission,
    ProgressNotifier, UserInfo, UserProgress,
};
pub use catalog::{Difficulty, LevelCatalog, LevelDef, MapPosition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AlverseConfig, ConfigError};
pub use evaluate::{PassInputs, PassPolicy, PassRule, Verdict, evaluate};
pub use gate::{GateDecision, GateReason, can_open_from_map, can_play};
pub use level::{LevelRef, level_id_for, parse_level_number, sanitise_level_id};
pub use map::{LevelMapModel, LevelNode, MapViewState};
pub use payload::{
    CanonicalCompletionRecord, Field, PayloadError, RawCompletionPayload, normalize,
    normalize_with,
};
pub use progress::{AttemptRecord, LevelStatus, ProgressSnapshot, aggregate};
pub use service::{Generation, ProgressService, ProgressWatch, ServiceError, telemetry_row};
pub use session::{ResolvedSession, SessionContext, SessionCorrelator, resolve};
pub use storage::{CachedIdentity, KeyValueStore, MemoryStore, StorageError};
