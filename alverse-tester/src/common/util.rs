use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thirtyfour::prelude::*;

use crate::browser::UnityBridge;

/// `<base>/<browser>/<scenario>/<timestamp>`, one directory per failed run.
pub fn artifacts_dir(base: &str, browser: &str, scenario: &str) -> PathBuf {
    let slug: String = scenario
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    Path::new(base)
        .join(browser)
        .join(slug)
        .join(Utc::now().format("%Y%m%dT%H%M%S").to_string())
}

/// What the page looked like when a browser scenario failed.
#[derive(Debug, Serialize)]
struct FailureRecord {
    captured_at: String,
    error: String,
    /// URL and stored game session, when the page still answers.
    page: Option<Value>,
}

pub async fn capture_artifacts(driver: &WebDriver, dir: &Path, err: &anyhow::Error) -> Result<()> {
    let record = FailureRecord {
        captured_at: Utc::now().to_rfc3339(),
        error: format!("{err:#}"),
        page: UnityBridge::new(driver).state().await.ok(),
    };
    let screenshot = driver.screenshot_as_png().await.ok();
    write_failure(dir, &record, screenshot.as_deref())
}

fn write_failure(dir: &Path, record: &FailureRecord, screenshot: Option<&[u8]>) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    fs::write(dir.join("failure.json"), serde_json::to_vec_pretty(record)?)
        .context("writing failure.json")?;
    if let Some(png) = screenshot {
        fs::write(dir.join("screenshot.png"), png).context("writing screenshot")?;
    }
    Ok(())
}

/// Comma-separated CLI list, lowercased, without blanks or repeats.
pub fn split_csv(s: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let item = item.to_ascii_lowercase();
        if !items.contains(&item) {
            items.push(item);
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_are_normalised() {
        let parts = split_csv(" Smoke, ,reset,smoke,  gate-replay ");
        assert_eq!(parts, vec!["smoke", "reset", "gate-replay"]);
    }

    #[test]
    fn artifacts_dir_slugs_the_scenario() {
        let dir = artifacts_dir("target/out", "chrome", "Level Map");
        assert!(dir.starts_with("target/out/chrome/level-map"));
    }

    #[test]
    fn failures_are_written_as_json() {
        let base = std::env::temp_dir().join(format!(
            "alverse-artifacts-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let record = FailureRecord {
            captured_at: "2024-05-01T10:00:00+00:00".into(),
            error: "level 3 refused".into(),
            page: Some(json!({ "url": "http://localhost/level3.html", "session": null })),
        };
        write_failure(&base, &record, None).unwrap();

        let written: Value =
            serde_json::from_slice(&fs::read(base.join("failure.json")).unwrap()).unwrap();
        assert_eq!(written["error"], "level 3 refused");
        assert_eq!(written["page"]["url"], "http://localhost/level3.html");
        assert!(!base.join("screenshot.png").exists());
    }
}
