//! Normalisation of engine completion payloads.
//!
//! Every logical field is resolved through an ordered alias table and coerced
//! to its canonical type. Normalisation itself never fails: absent or
//! uncoercible values fall back to the documented default. Only parsing a
//! payload string that is not JSON is an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::evaluate::{PassInputs, PassPolicy, PassRule, evaluate};
use crate::level::{LevelRef, parse_level_number, sanitise_level_id};

/// Errors raised while reading a payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Malformed completion payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Canonical fields recognised in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    TotalQuestions,
    WrongAnswers,
    SceneRuns,
    Time3d,
    Time2d,
    StartTimestamp,
    EndTimestamp,
    HintUsed,
    FinalScore,
    LevelId,
    SessionId,
    UserId,
    AllowedWrongAnswers,
    Passed,
    LevelCompleted,
    IsComplete,
    VideoCompleted,
}

/// How a selected raw value is turned into its canonical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Number,
    /// Only genuine JSON booleans.
    StrictBoolean,
    /// JSON booleans and `"true"`/`"false"` strings.
    Boolean,
    Text,
    Level,
}

/// How the alias list is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Take the first alias holding a non-null value, then coerce it.
    FirstPresent,
    /// Take the first alias whose value coerces.
    FirstCoercible,
}

/// One row of the alias table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub aliases: &'static [&'static str],
    pub coercion: Coercion,
    pub selection: Selection,
}

const fn spec(field: Field, aliases: &'static [&'static str], coercion: Coercion) -> FieldSpec {
    FieldSpec {
        field,
        aliases,
        coercion,
        selection: Selection::FirstPresent,
    }
}

/// The alias table, in canonical field order.
pub const FIELD_TABLE: &[FieldSpec] = &[
    spec(
        Field::TotalQuestions,
        &["totalQuestions", "total_questions"],
        Coercion::Number,
    ),
    spec(
        Field::WrongAnswers,
        &["wrongAnswers", "wrong_answers"],
        Coercion::Number,
    ),
    spec(Field::SceneRuns, &["sceneRuns", "scene_runs"], Coercion::Number),
    spec(
        Field::Time3d,
        &[
            "timeToFindTrainingZonein3D",
            "time_zone_3d",
            "time3D",
            "timeToFindZone",
        ],
        Coercion::Number,
    ),
    spec(
        Field::Time2d,
        &[
            "timeSpendinTraining2D",
            "time_training_2d",
            "time2D",
            "timeInTraining2D",
            "timeSpentInTraining2D",
        ],
        Coercion::Number,
    ),
    spec(
        Field::StartTimestamp,
        &[
            "initialTimestamp",
            "initial_time",
            "timestamp_start",
            "startTimestamp",
            "startTime",
        ],
        Coercion::Text,
    ),
    spec(
        Field::EndTimestamp,
        &[
            "finalTimestamp",
            "final_time",
            "timestamp_end",
            "endTimestamp",
            "endTime",
            "finishTime",
        ],
        Coercion::Text,
    ),
    spec(
        Field::HintUsed,
        &["hintUsed", "hint_used", "usedHint"],
        Coercion::Boolean,
    ),
    spec(Field::FinalScore, &["finalScore", "score"], Coercion::Number),
    spec(
        Field::LevelId,
        &["levelID", "levelId", "level_id", "level", "levelNumber"],
        Coercion::Level,
    ),
    spec(
        Field::SessionId,
        &["sessionID", "sessionId", "session_id", "session"],
        Coercion::Text,
    ),
    spec(
        Field::UserId,
        &["userID", "userId", "uid", "user_id"],
        Coercion::Text,
    ),
    FieldSpec {
        field: Field::AllowedWrongAnswers,
        aliases: &["allowedWrongAnswers", "maxWrongAnswers", "allowedMistakes"],
        coercion: Coercion::Number,
        selection: Selection::FirstCoercible,
    },
    spec(Field::Passed, &["passed"], Coercion::StrictBoolean),
    spec(
        Field::LevelCompleted,
        &["levelCompleted"],
        Coercion::StrictBoolean,
    ),
    spec(Field::IsComplete, &["isComplete"], Coercion::StrictBoolean),
    spec(
        Field::VideoCompleted,
        &["videoCompleted"],
        Coercion::Boolean,
    ),
];

/// Look up the table row for a field.
#[must_use]
pub fn field_spec(field: Field) -> &'static FieldSpec {
    FIELD_TABLE
        .iter()
        .find(|spec| spec.field == field)
        .unwrap_or(&FIELD_TABLE[0])
}

/// Coerce a raw value into a finite number.
#[must_use]
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Coerce a raw value into a boolean (`"true"`/`"false"` strings accepted).
#[must_use]
pub fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An untyped completion payload as delivered by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCompletionPayload {
    fields: Map<String, Value>,
}

impl RawCompletionPayload {
    /// Parse a JSON string payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Malformed`] when the text is not valid JSON.
    pub fn parse(json: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value(value))
    }

    /// Wrap an already-parsed value. Anything but an object reads as empty.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    /// Raw value stored under `key`, treating `null` as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    fn select(&self, spec: &FieldSpec) -> Option<&Value> {
        match spec.selection {
            Selection::FirstPresent => spec.aliases.iter().find_map(|key| self.get(key)),
            Selection::FirstCoercible => spec
                .aliases
                .iter()
                .filter_map(|key| self.get(key))
                .find(|value| coerces(value, spec.coercion)),
        }
    }

    /// Resolve a numeric field.
    #[must_use]
    pub fn number(&self, field: Field) -> Option<f64> {
        self.select(field_spec(field)).and_then(to_number)
    }

    /// Resolve a boolean field using the field's own coercion.
    #[must_use]
    pub fn boolean(&self, field: Field) -> Option<bool> {
        let spec = field_spec(field);
        let value = self.select(spec)?;
        match spec.coercion {
            Coercion::StrictBoolean => value.as_bool(),
            _ => to_boolean(value),
        }
    }

    /// Resolve a text field.
    #[must_use]
    pub fn text(&self, field: Field) -> Option<String> {
        self.select(field_spec(field)).and_then(to_text)
    }

    /// Resolve the canonical level id, defaulting to the first level.
    #[must_use]
    pub fn level_id(&self) -> String {
        sanitise_level_id(LevelRef::from(self.select(field_spec(Field::LevelId))))
    }
}

fn coerces(value: &Value, coercion: Coercion) -> bool {
    match coercion {
        Coercion::Number => to_number(value).is_some(),
        Coercion::StrictBoolean => value.is_boolean(),
        Coercion::Boolean => to_boolean(value).is_some(),
        Coercion::Text => to_text(value).is_some(),
        Coercion::Level => true,
    }
}

/// A completion payload with every field resolved to its canonical name and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalCompletionRecord {
    pub level_id: String,
    /// `None` when the level id has no usable number.
    pub level_number: Option<u32>,
    pub session_id: Option<String>,
    pub user_id_from_payload: Option<String>,
    pub total_questions: Option<f64>,
    pub wrong_answers: Option<f64>,
    pub scene_runs: Option<f64>,
    pub time_3d: Option<f64>,
    pub time_2d: Option<f64>,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    pub hint_used: bool,
    pub final_score: f64,
    pub passed: bool,
    pub pass_rule: PassRule,
}

/// Normalise a payload with the default pass thresholds.
#[must_use]
pub fn normalize(raw: &RawCompletionPayload) -> CanonicalCompletionRecord {
    normalize_with(raw, &PassPolicy::default())
}

/// Normalise a payload, evaluating pass/fail under `policy`.
#[must_use]
pub fn normalize_with(raw: &RawCompletionPayload, policy: &PassPolicy) -> CanonicalCompletionRecord {
    let total_questions = raw.number(Field::TotalQuestions);
    let wrong_answers = raw.number(Field::WrongAnswers);
    let reported_score = raw.number(Field::FinalScore);
    let level_id = raw.level_id();
    let level_number = parse_level_number(&level_id);

    let inputs = PassInputs {
        passed: raw.boolean(Field::Passed),
        level_completed: raw.boolean(Field::LevelCompleted),
        is_complete: raw.boolean(Field::IsComplete),
        video_completed: raw.boolean(Field::VideoCompleted),
        wrong_answers,
        total_questions,
        allowed_wrong_answers: raw.number(Field::AllowedWrongAnswers),
        final_score: reported_score,
    };
    let verdict = evaluate(&inputs, policy);

    CanonicalCompletionRecord {
        level_id,
        level_number,
        session_id: raw.text(Field::SessionId),
        user_id_from_payload: raw.text(Field::UserId),
        total_questions,
        wrong_answers,
        scene_runs: raw.number(Field::SceneRuns),
        time_3d: raw.number(Field::Time3d),
        time_2d: raw.number(Field::Time2d),
        start_timestamp: raw.text(Field::StartTimestamp),
        end_timestamp: raw.text(Field::EndTimestamp),
        hint_used: raw.boolean(Field::HintUsed).unwrap_or(false),
        final_score: reported_score.unwrap_or(0.0),
        passed: verdict.passed,
        pass_rule: verdict.rule,
    }
}
