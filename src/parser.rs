//! parser.rs — validate and decode the classifier's raw text.
//!
//! The backend is told to answer with a single JSON object, but models wrap
//! their output in prose often enough that we also accept exactly one object
//! embedded in surrounding text (first `{` to last `}`). A failed parse is
//! terminal for the report and is handled exactly like a transport failure;
//! there is no retry.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::assessment::{ReporterPenalty, ViolationAction, ViolationAssessment, ViolationLevel};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in classifier response")]
    NoJsonObject,
    #[error("classifier response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("classifier response missing required field `{0}`")]
    MissingField(&'static str),
    #[error("`actions` is not a list")]
    ActionsNotAList,
    #[error("violation level out of range: {0}")]
    LevelOutOfRange(i64),
}

/// Raw action entry as the model emits it. Decoded leniently: unknown types
/// and entries missing their mandatory payload are skipped with a warning
/// instead of failing the whole assessment.
#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    seconds: Option<u64>,
    #[serde(default)]
    count: Option<u32>,
}

/// Decode `raw` into a structurally valid [`ViolationAssessment`].
pub fn parse_assessment(raw: &str) -> Result<ViolationAssessment, ParseError> {
    let object = extract_object(raw).ok_or(ParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(object)?;

    let level_num = value
        .get("level")
        .ok_or(ParseError::MissingField("level"))?
        .as_i64()
        .ok_or(ParseError::MissingField("level"))?;
    let level = ViolationLevel::try_from(u8::try_from(level_num).map_err(|_| {
        ParseError::LevelOutOfRange(level_num)
    })?)
    .map_err(|_| ParseError::LevelOutOfRange(level_num))?;

    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField("reason"))?
        .to_string();

    let actions_value = value
        .get("actions")
        .ok_or(ParseError::MissingField("actions"))?;
    let entries = actions_value.as_array().ok_or(ParseError::ActionsNotAList)?;

    let mut actions = Vec::with_capacity(entries.len());
    for entry in entries {
        match decode_action(entry) {
            Some(action) => actions.push(action),
            None => warn!(entry = %entry, "skipping unrecognized enforcement action"),
        }
    }

    let reporter_penalty = value
        .get("reporterPenalty")
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value::<ReporterPenalty>(v.clone()).ok());

    Ok(ViolationAssessment {
        level,
        reason,
        actions,
        reporter_penalty,
    })
}

fn decode_action(entry: &Value) -> Option<ViolationAction> {
    let raw: RawAction = serde_json::from_value(entry.clone()).ok()?;
    match raw.kind.as_str() {
        "mute" => raw.seconds.map(|seconds| ViolationAction::Mute { seconds }),
        "warn" => raw.count.map(|count| ViolationAction::Warn { count }),
        "expel" => Some(ViolationAction::Expel),
        "expelAndBan" => Some(ViolationAction::ExpelAndBan),
        _ => None,
    }
}

/// Whole trimmed object, or the first-`{`-to-last-`}` slice.
fn extract_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&trimmed[start..=end])
}
