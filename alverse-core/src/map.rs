//! View model for the level map page.
use serde::{Deserialize, Serialize};

use crate::catalog::{Difficulty, LevelCatalog, MapPosition};
use crate::config::AlverseConfig;
use crate::gate::can_open_from_map;
use crate::level::level_id_for;
use crate::numbers::u32_to_f64;
use crate::progress::{LevelStatus, ProgressSnapshot};

/// Page state that is not part of the player's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapViewState {
    pub signed_in: bool,
    pub loading: bool,
    /// A write (next or reset) is in flight.
    pub busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelNode {
    pub number: u32,
    pub level_id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub stars: u8,
    pub description: String,
    pub icon: String,
    pub position: MapPosition,
    pub status: LevelStatus,
    pub can_open: bool,
    pub high_score: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelMapModel {
    pub nodes: Vec<LevelNode>,
    pub current_level: u32,
    /// Share of the path between the first and the current level, `0.0..=1.0`.
    pub path_progress: f64,
    pub all_completed: bool,
    pub next_enabled: bool,
    pub reset_enabled: bool,
    pub loading: bool,
}

impl LevelMapModel {
    #[must_use]
    pub fn from_snapshot(
        snapshot: &ProgressSnapshot,
        catalog: &LevelCatalog,
        view: MapViewState,
    ) -> Self {
        let nodes: Vec<LevelNode> = catalog
            .playable(snapshot.total_levels)
            .map(|def| {
                let level_id = level_id_for(def.id);
                LevelNode {
                    number: def.id,
                    high_score: snapshot.high_score(&level_id),
                    level_id,
                    topic: def.topic.clone(),
                    difficulty: def.difficulty,
                    stars: def.stars,
                    description: def.description.clone(),
                    icon: def.icon.clone(),
                    position: catalog.position(def),
                    status: snapshot.level_status(def.id),
                    can_open: can_open_from_map(def.id, snapshot),
                }
            })
            .collect();

        let all_completed = snapshot.all_completed();
        let segments = nodes.len().saturating_sub(1);
        let path_progress = if segments == 0 {
            0.0
        } else {
            let done = u32_to_f64(snapshot.next_playable_level.saturating_sub(1));
            let total = u32_to_f64(u32::try_from(segments).unwrap_or(u32::MAX));
            (done / total).min(1.0)
        };

        Self {
            nodes,
            current_level: snapshot.next_playable_level,
            path_progress,
            all_completed,
            next_enabled: view.signed_in && !view.loading && !view.busy && !all_completed,
            reset_enabled: view.signed_in && !view.busy,
            loading: view.loading,
        }
    }

    #[must_use]
    pub fn node(&self, level_number: u32) -> Option<&LevelNode> {
        self.nodes.iter().find(|node| node.number == level_number)
    }

    /// Page to open when a node is clicked, if the click is allowed.
    #[must_use]
    pub fn click_target(&self, level_number: u32, config: &AlverseConfig) -> Option<String> {
        if self.loading {
            return None;
        }
        self.node(level_number)
            .filter(|node| node.can_open)
            .map(|node| config.level_page_url(node.number))
    }

    /// Where the player marker sits.
    #[must_use]
    pub fn marker_position(&self) -> Option<MapPosition> {
        self.node(self.current_level).map(|node| node.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{AttemptRecord, aggregate};
    use chrono::{DateTime, Utc};

    fn snapshot(levels: impl IntoIterator<Item = u32>) -> ProgressSnapshot {
        let rows: Vec<_> = levels
            .into_iter()
            .map(|n| AttemptRecord::new("u", &n.to_string(), n * 10, DateTime::<Utc>::UNIX_EPOCH))
            .collect();
        aggregate("u", &rows, 14)
    }

    const READY: MapViewState = MapViewState {
        signed_in: true,
        loading: false,
        busy: false,
    };

    #[test]
    fn statuses_and_progress_follow_snapshot() {
        let model = LevelMapModel::from_snapshot(&snapshot([1, 2]), LevelCatalog::default_catalog(), READY);
        assert_eq!(model.nodes.len(), 14);
        assert_eq!(model.current_level, 3);
        assert_eq!(model.node(1).unwrap().status, LevelStatus::Completed);
        assert_eq!(model.node(3).unwrap().status, LevelStatus::Current);
        assert_eq!(model.node(4).unwrap().status, LevelStatus::Locked);
        assert_eq!(model.node(2).unwrap().high_score, Some(20));
        assert!((model.path_progress - 2.0 / 13.0).abs() < 1e-9);
        assert!(model.next_enabled);
    }

    #[test]
    fn only_current_level_is_clickable_until_finished() {
        let config = AlverseConfig::default();
        let model = LevelMapModel::from_snapshot(&snapshot([1, 2]), LevelCatalog::default_catalog(), READY);
        assert_eq!(model.click_target(3, &config).as_deref(), Some("level3.html"));
        assert_eq!(model.click_target(1, &config), None);
        assert_eq!(model.click_target(5, &config), None);

        let loading = LevelMapModel::from_snapshot(
            &snapshot([1, 2]),
            LevelCatalog::default_catalog(),
            MapViewState {
                loading: true,
                ..READY
            },
        );
        assert_eq!(loading.click_target(3, &config), None);
        assert!(!loading.next_enabled);
    }

    #[test]
    fn finished_map_allows_replays_and_hides_next() {
        let config = AlverseConfig::default();
        let model = LevelMapModel::from_snapshot(&snapshot(1..=14), LevelCatalog::default_catalog(), READY);
        assert!(model.all_completed);
        assert!(!model.next_enabled);
        assert!(model.reset_enabled);
        assert!((model.path_progress - 1.0).abs() < 1e-9);
        assert_eq!(model.click_target(1, &config).as_deref(), Some("level1.html"));
    }

    #[test]
    fn busy_or_signed_out_disables_controls() {
        let model = LevelMapModel::from_snapshot(
            &snapshot([]),
            LevelCatalog::default_catalog(),
            MapViewState {
                busy: true,
                ..READY
            },
        );
        assert!(!model.next_enabled);
        assert!(!model.reset_enabled);
        assert_eq!(model.marker_position(), model.node(1).map(|n| n.position));

        let signed_out =
            LevelMapModel::from_snapshot(&snapshot([]), LevelCatalog::default_catalog(), MapViewState::default());
        assert!(!signed_out.next_enabled);
        assert!(!signed_out.reset_enabled);
    }
}
