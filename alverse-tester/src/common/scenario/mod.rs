use anyhow::Result;
use thirtyfour::prelude::*;

use crate::browser::UnityBridge;
use crate::logic::Harness;

pub mod progression;
pub mod smoke;

#[derive(Debug, Clone)]
pub struct ScenarioCtx<'a> {
    pub base_url: String,
    pub total_levels: Option<u32>,
    pub bridge: UnityBridge<'a>,
    pub verbose: bool,
}

pub type LogicCheck = fn(&Harness) -> Result<()>;

// Logic test scenario
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub check: LogicCheck,
}

// Browser test scenario
#[async_trait::async_trait]
pub trait BrowserScenario {
    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<()>;
}

// Combined scenario that can run both logic and browser tests
pub trait CombinedScenario: BrowserScenario {
    fn as_logic_scenario(&self) -> Option<TestScenario>;
}

/// Scenario that only exists as an in-memory logic check.
#[derive(Clone)]
pub struct LogicOnlyScenario {
    name: &'static str,
    check: LogicCheck,
}

impl LogicOnlyScenario {
    pub const fn new(name: &'static str, check: LogicCheck) -> Self {
        Self { name, check }
    }
}

#[async_trait::async_trait]
impl BrowserScenario for LogicOnlyScenario {
    async fn run_browser(&self, _driver: &WebDriver, _ctx: &ScenarioCtx<'_>) -> Result<()> {
        anyhow::bail!("{} has no browser implementation", self.name)
    }
}

impl CombinedScenario for LogicOnlyScenario {
    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(TestScenario {
            name: self.name.to_string(),
            check: self.check,
        })
    }
}

const SCENARIOS: &[(&str, &str)] = &[
    ("smoke", "Smoke Test"),
    ("first-clear", "First Clear of Every Level"),
    ("gate-replay", "Replay Gate Before and After Completion"),
    ("out-of-order", "Out-of-Order Completion"),
    ("reset", "Progress Reset"),
    ("simulate-next", "Next Level Button Until Completion"),
    ("payload-shapes", "Engine Payload Variants"),
    ("map", "Level Map Rendering"),
];

pub fn get_scenario(name: &str) -> Option<Box<dyn CombinedScenario + Send + Sync>> {
    let title = |key: &str| {
        SCENARIOS
            .iter()
            .find(|(k, _)| *k == key)
            .map_or("Unknown", |(_, title)| *title)
    };
    match name.to_lowercase().as_str() {
        "smoke" => Some(Box::new(smoke::SmokeScenario)),
        "map" | "level-map" => Some(Box::new(smoke::MapScenario)),
        "first-clear" | "full" => Some(Box::new(LogicOnlyScenario::new(
            title("first-clear"),
            progression::first_clear,
        ))),
        "gate-replay" | "gate" => Some(Box::new(LogicOnlyScenario::new(
            title("gate-replay"),
            progression::gate_replay,
        ))),
        "out-of-order" => Some(Box::new(LogicOnlyScenario::new(
            title("out-of-order"),
            progression::out_of_order,
        ))),
        "reset" => Some(Box::new(LogicOnlyScenario::new(
            title("reset"),
            progression::reset,
        ))),
        "simulate-next" | "next" => Some(Box::new(LogicOnlyScenario::new(
            title("simulate-next"),
            progression::simulate_next,
        ))),
        "payload-shapes" | "payloads" => Some(Box::new(LogicOnlyScenario::new(
            title("payload-shapes"),
            progression::payload_shapes,
        ))),
        _ => None,
    }
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    SCENARIOS.to_vec()
}

/// Keys behind `--scenarios all`.
pub fn all_scenario_keys() -> Vec<String> {
    SCENARIOS.iter().map(|(key, _)| (*key).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_scenario_resolves() {
        for (key, _) in list_scenarios() {
            assert!(get_scenario(key).is_some(), "{key} is listed but unknown");
        }
        assert!(get_scenario("nope").is_none());
    }

    #[test]
    fn logic_only_scenarios_carry_their_title() {
        let scenario = get_scenario("reset").unwrap();
        let logic = scenario.as_logic_scenario().unwrap();
        assert_eq!(logic.name, "Progress Reset");
    }
}
