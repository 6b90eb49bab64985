use anyhow::{Context, Result, ensure};
use thirtyfour::prelude::*;

use super::{BrowserScenario, CombinedScenario, ScenarioCtx, TestScenario, progression};

/// Bridge round trip: logic harness, or a signed-in level page in a browser.
pub struct SmokeScenario;

#[async_trait::async_trait]
impl BrowserScenario for SmokeScenario {
    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<()> {
        driver
            .goto(ctx.base_url.as_str())
            .await
            .with_context(|| format!("opening {}", ctx.base_url))?;
        ctx.bridge.ensure_available().await?;

        let info = ctx.bridge.user_info().await?;
        if ctx.verbose {
            println!("   player: {} <{}>", info.username, info.email);
        }

        let permission = ctx.bridge.can_play_level(1).await?;
        ensure!(
            !permission.reason.is_empty(),
            "canPlayLevel answered without a reason"
        );

        let progress = ctx.bridge.user_progress().await?;
        if let Some(total) = ctx.total_levels {
            ensure!(
                progress.completed_levels.iter().all(|level| *level <= total),
                "progress lists levels beyond {total}: {:?}",
                progress.completed_levels
            );
        }
        Ok(())
    }
}

impl CombinedScenario for SmokeScenario {
    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(TestScenario {
            name: "Smoke Test".to_string(),
            check: progression::smoke,
        })
    }
}

/// The level map renders one node per playable level.
pub struct MapScenario;

#[async_trait::async_trait]
impl BrowserScenario for MapScenario {
    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<()> {
        driver
            .goto(ctx.base_url.as_str())
            .await
            .with_context(|| format!("opening {}", ctx.base_url))?;
        let map = driver
            .find(By::Css("[data-testid='level-map']"))
            .await
            .context("level map did not render")?;
        let nodes = map.find_all(By::Css(".level-node")).await?;
        ensure!(!nodes.is_empty(), "level map has no nodes");
        if let Some(total) = ctx.total_levels {
            let expected = usize::try_from(total)?;
            ensure!(
                nodes.len() <= expected,
                "{} nodes rendered for {total} levels",
                nodes.len()
            );
        }

        let mut current = 0_usize;
        for node in &nodes {
            let class = node.class_name().await?.unwrap_or_default();
            if class.split_whitespace().any(|c| c == "current") {
                current += 1;
            }
        }
        ensure!(current <= 1, "{current} levels marked current");
        Ok(())
    }
}

impl CombinedScenario for MapScenario {
    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(TestScenario {
            name: "Level Map Rendering".to_string(),
            check: progression::map_model,
        })
    }
}
