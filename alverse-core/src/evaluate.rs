//! Pass/fail decision for a level attempt.
//!
//! The engine reports completion in different shapes depending on the level
//! type (quiz, video, free play). Rules are tried in a fixed priority order and
//! the first one that applies decides the outcome.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ALLOWED_WRONG_ANSWERS, WRONG_ANSWER_RATIO};
use crate::numbers::u32_to_f64;

/// Thresholds used when a payload does not carry its own allowance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassPolicy {
    /// Allowance when the question count is unknown or zero.
    pub default_allowed_wrong_answers: u32,
    /// Share of the question count that may be wrong.
    pub wrong_answer_ratio: f64,
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            default_allowed_wrong_answers: DEFAULT_ALLOWED_WRONG_ANSWERS,
            wrong_answer_ratio: WRONG_ANSWER_RATIO,
        }
    }
}

impl PassPolicy {
    /// Wrong answers tolerated for an attempt.
    #[must_use]
    pub fn allowed_wrong_answers(&self, explicit: Option<f64>, total_questions: Option<f64>) -> f64 {
        if let Some(explicit) = explicit {
            return explicit;
        }
        match total_questions {
            Some(total) if total > 0.0 => (total * self.wrong_answer_ratio).floor().max(0.0),
            _ => u32_to_f64(self.default_allowed_wrong_answers),
        }
    }
}

/// Fields consulted by the evaluator, already coerced by the normalizer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassInputs {
    pub passed: Option<bool>,
    pub level_completed: Option<bool>,
    pub is_complete: Option<bool>,
    pub video_completed: Option<bool>,
    pub wrong_answers: Option<f64>,
    pub total_questions: Option<f64>,
    pub allowed_wrong_answers: Option<f64>,
    /// Score as reported by the engine; `None` when the payload carried none.
    pub final_score: Option<f64>,
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "rule")]
pub enum PassRule {
    Passed,
    LevelCompleted,
    IsComplete,
    VideoCompleted,
    WrongAnswers { wrong: f64, allowed: f64 },
    FinalScore { score: f64 },
    Default,
}

/// Outcome of evaluating one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub passed: bool,
    pub rule: PassRule,
}

impl Verdict {
    const fn new(passed: bool, rule: PassRule) -> Self {
        Self { passed, rule }
    }
}

/// Decide whether an attempt counts as a pass.
#[must_use]
pub fn evaluate(inputs: &PassInputs, policy: &PassPolicy) -> Verdict {
    if let Some(passed) = inputs.passed {
        return Verdict::new(passed, PassRule::Passed);
    }
    if let Some(done) = inputs.level_completed {
        return Verdict::new(done, PassRule::LevelCompleted);
    }
    if let Some(done) = inputs.is_complete {
        return Verdict::new(done, PassRule::IsComplete);
    }
    if let Some(watched) = inputs.video_completed {
        return Verdict::new(watched, PassRule::VideoCompleted);
    }
    if let Some(wrong) = inputs.wrong_answers {
        let allowed =
            policy.allowed_wrong_answers(inputs.allowed_wrong_answers, inputs.total_questions);
        return Verdict::new(wrong <= allowed, PassRule::WrongAnswers { wrong, allowed });
    }
    if let Some(score) = inputs.final_score {
        return Verdict::new(score > 0.0, PassRule::FinalScore { score });
    }
    Verdict::new(true, PassRule::Default)
}
