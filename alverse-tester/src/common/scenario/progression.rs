//! Progression checks run against the in-memory harness.

use alverse_core::{LevelCatalog, LevelMapModel, LevelStatus, MapViewState, ServiceError};
use anyhow::{Result, bail, ensure};
use futures::executor::block_on;

use crate::logic::Harness;

const LOCKED_REASON: &str = "Level already completed. Finish all levels to unlock replay mode.";

/// One passing level and the bridge views that follow from it.
pub fn smoke(harness: &Harness) -> Result<()> {
    let permission = block_on(harness.bridge.can_play_level(1_u32));
    ensure!(permission.can_play, "level 1 refused: {}", permission.reason);
    harness.pass(1, 80)?;

    let progress = block_on(harness.bridge.get_user_progress());
    ensure!(
        progress.completed_levels == vec![1],
        "expected level 1 completed, got {:?}",
        progress.completed_levels
    );
    ensure!(progress.total_score == 80, "total score {}", progress.total_score);
    let info = harness.bridge.get_user_info();
    ensure!(!info.user_id.is_empty(), "user info has no id");
    Ok(())
}

/// Clear every level in order, then check replay and the leaderboard.
pub fn first_clear(harness: &Harness) -> Result<()> {
    let total = harness.total_levels();
    for level in 1..=total {
        let permission = block_on(harness.bridge.can_play_level(level));
        ensure!(
            permission.can_play,
            "level {level} refused before first play: {}",
            permission.reason
        );
        harness.pass(level, level * 10)?;
    }

    let snapshot = harness.snapshot()?;
    ensure!(snapshot.all_completed(), "not every level completed");
    ensure!(
        harness.notifications.count() == total,
        "{} notifications for {total} passes",
        harness.notifications.count()
    );

    let replay = block_on(harness.bridge.can_play_level(1_u32));
    ensure!(
        replay.can_play && replay.reason == "Replay mode active",
        "replay not unlocked: {}",
        replay.reason
    );

    let leaders = block_on(harness.bridge.get_leaderboard(None, Some(1)));
    ensure!(
        leaders.first().map(|entry| entry.score) == Some(total * 10),
        "leaderboard top is {:?}",
        leaders.first().map(|entry| entry.score)
    );
    Ok(())
}

/// Completed levels are locked until the run is finished; future levels stay locked.
pub fn gate_replay(harness: &Harness) -> Result<()> {
    harness.pass(1, 30)?;

    let again = block_on(harness.bridge.can_play_level(1_u32));
    ensure!(!again.can_play, "completed level 1 reopened mid-run");
    ensure!(again.reason == LOCKED_REASON, "unexpected reason: {}", again.reason);

    let next = block_on(harness.bridge.can_play_level("level_2"));
    ensure!(next.can_play, "level 2 refused: {}", next.reason);

    let snapshot = harness.snapshot()?;
    ensure!(
        !alverse_core::can_open_from_map(3, &snapshot),
        "level 3 opens from the map before level 2"
    );
    Ok(())
}

/// Passing a later level first counts as one completed level.
pub fn out_of_order(harness: &Harness) -> Result<()> {
    let total = harness.total_levels();
    ensure!(total >= 3, "out-of-order needs at least 3 levels, have {total}");
    harness.pass(total, 10)?;

    let snapshot = harness.snapshot()?;
    ensure!(
        snapshot.next_playable_level == 2,
        "next playable is {}",
        snapshot.next_playable_level
    );
    ensure!(snapshot.is_completed(total), "level {total} not recorded");
    Ok(())
}

/// Reset wipes scores and telemetry and reopens level 1.
pub fn reset(harness: &Harness) -> Result<()> {
    let service = harness.service();
    block_on(service.simulate_next())?;
    block_on(service.simulate_next())?;
    harness.pass(3, 70)?;
    ensure!(!harness.backend.telemetry().is_empty(), "no telemetry recorded");

    let snapshot = block_on(service.reset_progress())?;
    ensure!(snapshot.completed_count() == 0, "levels survived the reset");
    ensure!(snapshot.next_playable_level == 1, "reset did not return to level 1");
    ensure!(harness.backend.scores().is_empty(), "score rows survived the reset");
    ensure!(harness.backend.telemetry().is_empty(), "telemetry survived the reset");

    let permission = block_on(harness.bridge.can_play_level(1_u32));
    ensure!(permission.can_play, "level 1 refused after reset");
    Ok(())
}

/// The next button stops once everything is complete.
pub fn simulate_next(harness: &Harness) -> Result<()> {
    let service = harness.service();
    for _ in 0..harness.total_levels() {
        block_on(service.simulate_next())?;
    }
    match block_on(service.simulate_next()) {
        Err(ServiceError::AllLevelsCompleted) => Ok(()),
        Err(other) => bail!("unexpected refusal: {other}"),
        Ok(_) => bail!("next level recorded past the last level"),
    }
}

/// Engine payload variants that must pass or fail regardless of field spelling.
pub fn payload_shapes(harness: &Harness) -> Result<()> {
    let failing = [
        r#"{"levelID":1,"wrongAnswers":4,"totalQuestions":8}"#,
        r#"{"levelID":1,"videoCompleted":"false"}"#,
        r#"{"level":"1","passed":false}"#,
        r#"{"level":"1","passed":"false","score":0}"#,
    ];
    for payload in failing {
        let response = harness.play(1, payload)?;
        ensure!(
            response.can_proceed == Some(false),
            "payload passed unexpectedly: {payload}"
        );
    }
    ensure!(harness.backend.scores().is_empty(), "failing attempts stored a score");
    ensure!(
        harness.backend.telemetry().len() == failing.len(),
        "every attempt should leave telemetry"
    );

    let response = harness.play(1, r#"{"level_id":"level_1","score":"85","passed":"true"}"#)?;
    ensure!(response.can_proceed == Some(true), "string-typed pass was refused");
    let snapshot = harness.snapshot()?;
    ensure!(
        snapshot.high_score("level_1") == Some(85),
        "high score is {:?}",
        snapshot.high_score("level_1")
    );

    // Only a real boolean counts as a pass flag.
    let response = harness.play(2, r#"{"level":"2","passed":"false"}"#)?;
    ensure!(
        response.can_proceed == Some(true),
        "string pass flag was not ignored"
    );
    Ok(())
}

/// The map model mirrors the snapshot after a couple of passes.
pub fn map_model(harness: &Harness) -> Result<()> {
    harness.pass(1, 20)?;
    harness.pass(2, 40)?;
    let snapshot = harness.snapshot()?;
    let model = LevelMapModel::from_snapshot(
        &snapshot,
        LevelCatalog::default_catalog(),
        MapViewState {
            signed_in: true,
            ..MapViewState::default()
        },
    );

    let expected = LevelCatalog::default_catalog()
        .playable(harness.total_levels())
        .count();
    ensure!(
        model.nodes.len() == expected,
        "{} nodes, expected {expected}",
        model.nodes.len()
    );
    ensure!(model.current_level == 3, "marker on level {}", model.current_level);
    ensure!(
        model.node(3).map(|node| node.status) == Some(LevelStatus::Current),
        "level 3 is not current"
    );
    ensure!(
        model.node(2).and_then(|node| node.high_score) == Some(40),
        "level 2 best score missing"
    );
    ensure!(model.next_enabled, "next button disabled mid-run");
    Ok(())
}
