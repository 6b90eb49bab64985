use alverse_core::AlverseConfig;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::common::scenario::TestScenario;
use crate::logic::Harness;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
}

pub struct LogicTester {
    config: AlverseConfig,
    verbose: bool,
}

impl LogicTester {
    pub const fn new(config: AlverseConfig, verbose: bool) -> Self {
        Self { config, verbose }
    }

    /// Run `scenario` `iterations` times, each against a fresh player.
    pub fn run_scenario(&self, scenario: &TestScenario, iterations: usize) -> ScenarioResult {
        if self.verbose {
            println!(
                "🧪 Testing scenario: {} ({} levels)",
                scenario.name.bright_white(),
                self.config.total_levels()
            );
        }

        let mut successes = 0;
        let mut failures = Vec::new();
        let mut timings = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let outcome = Harness::signed_in(self.config.clone(), &format!("tester{}", i + 1))
                .and_then(|harness| (scenario.check)(&harness));
            let duration = start_time.elapsed();

            match outcome {
                Ok(()) => {
                    successes += 1;
                    timings.push(duration);
                    if self.verbose {
                        println!("  ✅ Iteration {}/{} passed ({duration:?})", i + 1, iterations);
                    }
                }
                Err(err) => {
                    let message = format!("Iteration {}: {err:#}", i + 1);
                    if self.verbose {
                        println!("  ❌ {}", message.clone().red());
                    }
                    log::debug!("{} failed: {err:?}", scenario.name);
                    failures.push(message);
                }
            }
        }

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration: average(&timings),
        }
    }
}

fn average(timings: &[Duration]) -> Duration {
    if timings.is_empty() {
        Duration::ZERO
    } else {
        timings.iter().sum::<Duration>() / u32::try_from(timings.len()).unwrap_or(u32::MAX)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn always_fails(_: &Harness) -> anyhow::Result<()> {
        bail!("nope")
    }

    #[test]
    fn failures_are_collected_per_iteration() {
        let tester = LogicTester::new(AlverseConfig::default(), false);
        let scenario = TestScenario {
            name: "Broken".into(),
            check: always_fails,
        };
        let result = tester.run_scenario(&scenario, 2);
        assert!(!result.passed);
        assert_eq!(result.successful_iterations, 0);
        assert_eq!(result.failures, vec!["Iteration 1: nope", "Iteration 2: nope"]);
    }

    #[test]
    fn progression_scenarios_pass_on_a_small_deployment() {
        let config = AlverseConfig::default().with_total_levels_override(Some(4.0));
        let tester = LogicTester::new(config, false);
        for key in crate::common::scenario::all_scenario_keys() {
            let scenario = crate::common::scenario::get_scenario(&key)
                .and_then(|s| s.as_logic_scenario())
                .unwrap();
            let result = tester.run_scenario(&scenario, 1);
            assert!(result.passed, "{key}: {:?}", result.failures);
        }
    }

    #[test]
    fn durations_serialise_as_millis() {
        let result = ScenarioResult {
            scenario_name: "Smoke Test".into(),
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 12);
    }
}
