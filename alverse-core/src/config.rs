//! Deployment configuration shared by the bridge, the map and the tester.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_ALLOWED_WRONG_ANSWERS, DEFAULT_TOTAL_LEVELS, PROGRESS_UPDATED_EVENT,
    WRONG_ANSWER_RATIO,
};
use crate::evaluate::PassPolicy;

const DEFAULT_CONFIG_DATA: &str =
    include_str!("../../alverse-web/static/assets/data/config.json");

const LEVEL_NUMBER_PLACEHOLDER: &str = "{n}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Level page template must contain {{n}}: {0}")]
    MissingPlaceholder(String),
    #[error("Wrong answer ratio must be within 0..=1, got {0}")]
    InvalidRatio(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlverseConfig {
    /// Signed so that a zero or negative deployment value can be detected and ignored.
    pub total_levels: i64,
    pub map_url: String,
    pub login_url: String,
    pub level_page_template: String,
    pub allowed_wrong_answers_default: u32,
    pub wrong_answer_ratio: f64,
    pub scores_table: String,
    pub telemetry_table: String,
    pub users_table: String,
    pub progress_event: String,
}

impl Default for AlverseConfig {
    fn default() -> Self {
        Self {
            total_levels: i64::from(DEFAULT_TOTAL_LEVELS),
            map_url: "/LevelMap/dist/index.html".to_string(),
            login_url: "/login.html".to_string(),
            level_page_template: "level{n}.html".to_string(),
            allowed_wrong_answers_default: DEFAULT_ALLOWED_WRONG_ANSWERS,
            wrong_answer_ratio: WRONG_ANSWER_RATIO,
            scores_table: "scores".to_string(),
            telemetry_table: "telemetry_sessions".to_string(),
            users_table: "users".to_string(),
            progress_event: PROGRESS_UPDATED_EVENT.to_string(),
        }
    }
}

impl AlverseConfig {
    /// Embedded deployment defaults. Falls back to [`Default`] if the bundled file is unusable.
    #[must_use]
    pub fn load_from_static() -> Self {
        Self::from_json(DEFAULT_CONFIG_DATA).unwrap_or_default()
    }

    /// Parse and validate a configuration document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.level_page_template.contains(LEVEL_NUMBER_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(
                self.level_page_template.clone(),
            ));
        }
        if !(0.0..=1.0).contains(&self.wrong_answer_ratio) {
            return Err(ConfigError::InvalidRatio(self.wrong_answer_ratio));
        }
        Ok(())
    }

    /// Level count in effect. Zero, negative and oversized values fall back to the default.
    #[must_use]
    pub fn total_levels(&self) -> u32 {
        u32::try_from(self.total_levels)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TOTAL_LEVELS)
    }

    /// Apply a level count override such as `window.ALVERSE_TOTAL_LEVELS`.
    ///
    /// Non-numeric, non-finite and non-positive overrides are ignored.
    #[must_use]
    pub fn with_total_levels_override(mut self, raw: Option<f64>) -> Self {
        if let Some(value) = raw.filter(|v| v.is_finite() && *v >= 1.0) {
            self.total_levels = crate::numbers::integral_f64_to_u64(value.floor())
                .and_then(|n| i64::try_from(n).ok())
                .unwrap_or(self.total_levels);
        }
        self
    }

    #[must_use]
    pub fn pass_policy(&self) -> PassPolicy {
        PassPolicy {
            default_allowed_wrong_answers: self.allowed_wrong_answers_default,
            wrong_answer_ratio: self.wrong_answer_ratio,
        }
    }

    /// Page that hosts the engine build for a level.
    #[must_use]
    pub fn level_page_url(&self, level_number: u32) -> String {
        self.level_page_template
            .replace(LEVEL_NUMBER_PLACEHOLDER, &level_number.to_string())
    }
}
