//! Level catalog shown on the map.
//!
//! Levels are laid out on stacked screens of seven. The first seven occupy the
//! bottom screen and each following group repeats the same layout one screen
//! higher, so the path climbs as the player progresses.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const DEFAULT_LEVEL_DATA: &str =
    include_str!("../../alverse-web/static/assets/data/levels.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A position on the map in percent of its width and full height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPosition {
    pub x: f64,
    pub y: f64,
}

/// One entry as stored in the catalog file; `y` is relative to its own screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDef {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub difficulty: Difficulty,
    pub stars: u8,
    pub description: String,
    pub icon: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelCatalog {
    #[serde(default = "default_levels_per_screen")]
    pub levels_per_screen: u32,
    #[serde(default)]
    pub levels: Vec<LevelDef>,
}

const fn default_levels_per_screen() -> u32 {
    7
}

impl Default for LevelCatalog {
    fn default() -> Self {
        Self {
            levels_per_screen: default_levels_per_screen(),
            levels: Vec::new(),
        }
    }
}

impl LevelCatalog {
    #[must_use]
    pub fn load_from_static() -> Self {
        serde_json::from_str(DEFAULT_LEVEL_DATA).unwrap_or_default()
    }

    #[must_use]
    pub fn default_catalog() -> &'static Self {
        static CATALOG: OnceLock<LevelCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::load_from_static)
    }

    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a level catalog.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[must_use]
    pub fn get(&self, level_number: u32) -> Option<&LevelDef> {
        self.levels.iter().find(|level| level.id == level_number)
    }

    /// The first `total_levels` entries in id order.
    pub fn playable(&self, total_levels: u32) -> impl Iterator<Item = &LevelDef> {
        self.levels
            .iter()
            .filter(move |level| (1..=total_levels).contains(&level.id))
    }

    fn screen_count(&self) -> u32 {
        let per_screen = self.levels_per_screen.max(1);
        let count = u32::try_from(self.levels.len()).unwrap_or(u32::MAX);
        count.div_ceil(per_screen).max(1)
    }

    /// Position of a level on the full stacked map, `y` measured from the top.
    #[must_use]
    pub fn position(&self, level: &LevelDef) -> MapPosition {
        let per_screen = self.levels_per_screen.max(1);
        let screens = self.screen_count();
        let screen_from_bottom = level.id.saturating_sub(1) / per_screen;
        let screen_from_top = screens.saturating_sub(1).saturating_sub(screen_from_bottom);
        let y = (f64::from(screen_from_top) * 100.0 + level.y) / f64::from(screens);
        MapPosition { x: level.x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_catalog_has_fourteen_levels_in_order() {
        let catalog = LevelCatalog::load_from_static();
        assert_eq!(catalog.len(), 14);
        let ids: Vec<u32> = catalog.levels.iter().map(|l| l.id).collect();
        assert_eq!(ids, (1_u32..=14).collect::<Vec<_>>());
        assert_eq!(catalog.get(1).map(|l| l.topic.as_str()), Some("Cyber"));
        assert_eq!(catalog.get(14).map(|l| l.topic.as_str()), Some("Zero Trust"));
        assert!(catalog.levels[7..].iter().all(|l| l.difficulty == Difficulty::Hard));
    }

    #[test]
    fn first_screen_sits_below_the_second() {
        let catalog = LevelCatalog::default_catalog();
        let first = catalog.get(1).map(|l| catalog.position(l)).unwrap();
        let eighth = catalog.get(8).map(|l| catalog.position(l)).unwrap();
        assert!((first.y - 92.5).abs() < 1e-9);
        assert!((eighth.y - 42.5).abs() < 1e-9);
        assert!((first.x - eighth.x).abs() < 1e-9);
    }

    #[test]
    fn playable_respects_total_levels() {
        let catalog = LevelCatalog::default_catalog();
        assert_eq!(catalog.playable(5).count(), 5);
        assert_eq!(catalog.playable(40).count(), 14);
    }
}
