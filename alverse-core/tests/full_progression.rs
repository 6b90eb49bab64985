use alverse_core::{
    AccountService, AlverseConfig, Backend, GameBridge, LevelCatalog, LevelMapModel, LevelStatus,
    ManualClock, MapViewState, MemoryBackend, MemoryStore, ProgressService, ServiceError,
    SignUpForm, UserMetadata,
};
use chrono::Duration;
use futures::executor::block_on;

type Bridge = GameBridge<MemoryBackend, MemoryStore, MemoryStore, ManualClock>;

struct World {
    backend: MemoryBackend,
    local: MemoryStore,
    clock: ManualClock,
    bridge: Bridge,
}

fn world_with(config: AlverseConfig) -> World {
    let backend = MemoryBackend::new();
    let local = MemoryStore::new();
    let clock = ManualClock::default();
    let service = ProgressService::new(backend.clone(), local.clone(), clock.clone(), config);
    let bridge = GameBridge::new(service, MemoryStore::new(), ());
    World {
        backend,
        local,
        clock,
        bridge,
    }
}

fn signed_up_world() -> World {
    let world = world_with(AlverseConfig::default());
    let accounts = AccountService::new(world.backend.clone(), world.local.clone(), world.clock.clone());
    let report = block_on(accounts.sign_up(&SignUpForm {
        username: "ada".into(),
        email: "ada@example.com".into(),
        school_name: "North High".into(),
        password: "secret".into(),
        password_confirm: "secret".into(),
    }))
    .unwrap();
    assert!(!report.confirmation_pending);
    world
}

fn play(world: &World, level: u32, payload: &str) -> bool {
    world.bridge.on_level_start(level, None);
    world.clock.advance(Duration::seconds(30));
    let response = block_on(world.bridge.on_level_complete_json(payload));
    assert!(response.success, "{response:?}");
    response.can_proceed.unwrap_or(false)
}

#[test]
fn quiz_pass_from_fresh_start() {
    let world = signed_up_world();
    let started = world.bridge.on_level_start("level_3", None);
    assert!(started.success);
    let response = block_on(
        world
            .bridge
            .on_level_complete_json(r#"{"levelID":3,"wrongAnswers":0,"totalQuestions":5}"#),
    );
    assert!(response.success);
    assert_eq!(response.can_proceed, Some(true));
    assert_eq!(response.score, Some(0.0));

    let progress = block_on(world.bridge.get_user_progress());
    assert_eq!(progress.completed_levels, vec![3]);
    let info = world.bridge.get_user_info();
    assert_eq!(info.username, "ada");
    assert_eq!(info.email, "ada@example.com");
}

#[test]
fn full_campaign_unlocks_replay_mode() {
    let world = signed_up_world();
    for level in 1_u32..=14 {
        let permission = block_on(world.bridge.can_play_level(level));
        assert!(permission.can_play, "level {level}: {}", permission.reason);
        assert_eq!(permission.reason, "First time play");

        let payload = format!(r#"{{"levelID":{level},"score":{},"passed":true}}"#, level * 10);
        assert!(play(&world, level, &payload));

        if level < 14 {
            let replay = block_on(world.bridge.can_play_level(level));
            assert!(!replay.can_play);
        }
    }

    let replay = block_on(world.bridge.can_play_level("level_5"));
    assert!(replay.can_play);
    assert_eq!(replay.reason, "Replay mode active");

    let progress = block_on(world.bridge.get_user_progress());
    assert_eq!(progress.completed_levels, (1_u32..=14).collect::<Vec<_>>());
    assert_eq!(progress.total_score, (1_u64..=14).map(|n| n * 10).sum::<u64>());

    let leaders = block_on(world.bridge.get_leaderboard(None, Some(3)));
    assert_eq!(leaders.iter().map(|e| e.score).collect::<Vec<_>>(), vec![140, 130, 120]);
    assert_eq!(leaders[0].username.as_deref(), Some("ada"));
    assert_eq!(leaders[0].school_name.as_deref(), Some("North High"));
}

#[test]
fn failing_attempts_do_not_advance() {
    let world = signed_up_world();
    assert!(!play(&world, 1, r#"{"levelID":1,"wrongAnswers":4,"totalQuestions":8}"#));
    assert!(!play(&world, 1, r#"{"levelID":1,"videoCompleted":"false"}"#));
    let progress = block_on(world.bridge.get_user_progress());
    assert!(progress.completed_levels.is_empty());
    assert_eq!(world.backend.telemetry().len(), 2);
    assert!(world.backend.scores().is_empty());
}

#[test]
fn out_of_order_completion_counts_levels_not_positions() {
    let world = signed_up_world();
    assert!(play(&world, 5, r#"{"levelID":5,"passed":true}"#));
    let snapshot = block_on(world.bridge.progress().load_progress()).unwrap();
    assert_eq!(snapshot.next_playable_level, 2);

    let model = LevelMapModel::from_snapshot(
        &snapshot,
        LevelCatalog::default_catalog(),
        MapViewState {
            signed_in: true,
            ..MapViewState::default()
        },
    );
    assert_eq!(model.node(5).map(|n| n.status), Some(LevelStatus::Completed));
    assert_eq!(model.node(2).map(|n| n.status), Some(LevelStatus::Current));
}

#[test]
fn reset_returns_to_first_level() {
    let world = signed_up_world();
    let service = world.bridge.progress();
    block_on(service.simulate_next()).unwrap();
    block_on(service.simulate_next()).unwrap();
    assert!(play(&world, 3, r#"{"levelID":3,"passed":true}"#));

    let snapshot = block_on(service.reset_progress()).unwrap();
    assert_eq!(snapshot.completed_count(), 0);
    assert_eq!(snapshot.next_playable_level, 1);
    assert!(world.backend.telemetry().is_empty());

    let permission = block_on(world.bridge.can_play_level(1_u32));
    assert!(permission.can_play);
}

#[test]
fn smaller_deployments_finish_sooner() {
    let config = AlverseConfig::from_json(r#"{"total_levels": 3}"#).unwrap();
    let world = world_with(config);
    let user = world
        .backend
        .register("lin@example.com", "pw", UserMetadata::default());
    world.backend.sign_in_as(&user);

    let service = world.bridge.progress();
    for _ in 0..3 {
        block_on(service.simulate_next()).unwrap();
    }
    assert!(matches!(
        block_on(service.simulate_next()),
        Err(ServiceError::AllLevelsCompleted)
    ));
    let replay = block_on(world.bridge.can_play_level(2_u32));
    assert_eq!(replay.reason, "Replay mode active");
}

#[test]
fn watcher_sees_bridge_inserts() {
    let world = signed_up_world();
    let user = block_on(world.backend.current_session())
        .unwrap()
        .unwrap()
        .user;
    let mut watch = world.bridge.progress().watch(&user.id);
    assert!(play(&world, 1, r#"{"levelID":1,"passed":true,"score":4}"#));
    let snapshot = block_on(watch.next()).unwrap();
    assert_eq!(snapshot.high_score("level_1"), Some(4));
}
