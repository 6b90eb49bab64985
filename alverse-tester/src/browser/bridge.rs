use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thirtyfour::prelude::*;

use alverse_core::constants::KEY_CURRENT_SESSION;
use alverse_core::{PlayPermission, UserInfo, UserProgress};

/// Resolves a bridge promise into the WebDriver async-script callback.
const SETTLE: &str = "const done = arguments[arguments.length - 1];\
     Promise.resolve(CALL).then(done, (e) => done(JSON.stringify({ success: false, error: String(e) })));";

/// Drives `window.UnityGameAPI` and `window.UnityGameData` on a loaded page.
#[derive(Debug, Clone)]
pub struct UnityBridge<'a> {
    driver: &'a WebDriver,
}

fn decode_json<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    let text = value
        .as_str()
        .with_context(|| format!("{what} did not answer with a JSON string: {value}"))?;
    serde_json::from_str(text).with_context(|| format!("parsing {what} reply"))
}

impl<'a> UnityBridge<'a> {
    pub const fn new(driver: &'a WebDriver) -> Self {
        Self { driver }
    }

    pub async fn ensure_available(&self) -> Result<()> {
        let result = self
            .driver
            .execute(
                "return !!(window.UnityGameAPI && window.UnityGameData)",
                vec![],
            )
            .await?;
        if !result.json().as_bool().unwrap_or(false) {
            bail!("UnityGameAPI is not installed. Is the wasm bundle loaded on this page?");
        }
        Ok(())
    }

    async fn call_async(&self, call: &str, args: Vec<Value>) -> Result<Value> {
        let script = SETTLE.replace("CALL", call);
        let result = self.driver.execute_async(script, args).await?;
        Ok(result.json().clone())
    }

    pub async fn user_info(&self) -> Result<UserInfo> {
        let result = self
            .driver
            .execute("return window.UnityGameAPI.getUserInfo()", vec![])
            .await?;
        decode_json(result.json(), "getUserInfo")
    }

    pub async fn can_play_level(&self, level: u32) -> Result<PlayPermission> {
        let reply = self
            .call_async(
                "window.UnityGameAPI.canPlayLevel(arguments[0])",
                vec![level.into()],
            )
            .await?;
        decode_json(&reply, "canPlayLevel")
    }

    pub async fn user_progress(&self) -> Result<UserProgress> {
        let reply = self
            .call_async("window.UnityGameData.getUserProgress()", vec![])
            .await?;
        serde_json::from_value(reply).context("parsing getUserProgress reply")
    }

    /// Current page state for failure artifacts.
    pub async fn state(&self) -> Result<Value> {
        let result = self
            .driver
            .execute(
                "return { url: location.href, session: sessionStorage.getItem(arguments[0]) }",
                vec![KEY_CURRENT_SESSION.into()],
            )
            .await?;
        Ok(result.json().clone())
    }
}
