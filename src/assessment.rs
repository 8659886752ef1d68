//! assessment.rs — structured output of the moderation classifier.
//!
//! The classifier returns one JSON object; these types are its decoded,
//! validated shape. `ViolationAction` is a closed sum type so that an
//! action without its mandatory payload (e.g. a mute without a duration)
//! is unrepresentable after parsing.

use serde::{Deserialize, Serialize};

/// Severity assigned by the classifier. 0 = no violation, 4 = most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ViolationLevel {
    None,
    Minor,
    Moderate,
    Severe,
    Critical,
}

impl ViolationLevel {
    /// Human-readable severity used in replies and audit entries.
    pub fn text(self) -> &'static str {
        match self {
            ViolationLevel::None => "none",
            ViolationLevel::Minor => "minor",
            ViolationLevel::Moderate => "moderate",
            ViolationLevel::Severe => "severe",
            ViolationLevel::Critical => "critical",
        }
    }
}

impl TryFrom<u8> for ViolationLevel {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(ViolationLevel::None),
            1 => Ok(ViolationLevel::Minor),
            2 => Ok(ViolationLevel::Moderate),
            3 => Ok(ViolationLevel::Severe),
            4 => Ok(ViolationLevel::Critical),
            other => Err(format!("violation level out of range: {other}")),
        }
    }
}

impl From<ViolationLevel> for u8 {
    fn from(v: ViolationLevel) -> u8 {
        match v {
            ViolationLevel::None => 0,
            ViolationLevel::Minor => 1,
            ViolationLevel::Moderate => 2,
            ViolationLevel::Severe => 3,
            ViolationLevel::Critical => 4,
        }
    }
}

/// One concrete remedial operation against the reported user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ViolationAction {
    #[serde(rename = "mute")]
    Mute { seconds: u64 },
    #[serde(rename = "warn")]
    Warn { count: u32 },
    #[serde(rename = "expel")]
    Expel,
    #[serde(rename = "expelAndBan")]
    ExpelAndBan,
}

impl ViolationAction {
    /// Short label used in summaries and audit details.
    pub fn label(&self) -> String {
        match self {
            ViolationAction::Mute { seconds } => format!("mute {seconds}s"),
            ViolationAction::Warn { count } => format!("warn x{count}"),
            ViolationAction::Expel => "expel".to_string(),
            ViolationAction::ExpelAndBan => "expel and ban".to_string(),
        }
    }
}

/// Classifier's verdict on the *reporter*: frivolous or malicious reports
/// earn a cooldown rather than any action against the reported user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReporterPenalty {
    #[serde(rename = "shouldLimit")]
    pub should_limit: bool,
    #[serde(rename = "durationMinutes", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Complete decoded assessment for one reported message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationAssessment {
    pub level: ViolationLevel,
    pub reason: String,
    #[serde(default)]
    pub actions: Vec<ViolationAction>,
    #[serde(rename = "reporterPenalty", skip_serializing_if = "Option::is_none")]
    pub reporter_penalty: Option<ReporterPenalty>,
}

impl ViolationAssessment {
    pub fn new(level: ViolationLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
            actions: Vec::new(),
            reporter_penalty: None,
        }
    }

    /// Append an action (builder style).
    pub fn with_action(mut self, action: ViolationAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_penalty(mut self, penalty: ReporterPenalty) -> Self {
        self.reporter_penalty = Some(penalty);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_shape_matches_wire_contract() {
        let a = ViolationAssessment::new(ViolationLevel::Moderate, "personal attack")
            .with_action(ViolationAction::Mute { seconds: 1800 })
            .with_action(ViolationAction::Warn { count: 1 });

        let v: serde_json::Value = serde_json::to_value(&a).unwrap();
        assert_eq!(v["level"], serde_json::json!(2));
        assert_eq!(v["actions"][0]["type"], serde_json::json!("mute"));
        assert_eq!(v["actions"][0]["seconds"], serde_json::json!(1800));
        assert_eq!(v["actions"][1]["type"], serde_json::json!("warn"));
        assert!(v.get("reporterPenalty").is_none());
    }

    #[test]
    fn level_rejects_out_of_range() {
        assert!(ViolationLevel::try_from(5u8).is_err());
        assert_eq!(ViolationLevel::try_from(4u8).unwrap(), ViolationLevel::Critical);
    }

    #[test]
    fn penalty_wire_names_are_camel_case() {
        let p = ReporterPenalty {
            should_limit: true,
            duration_minutes: Some(60),
            reason: Some("abuse".into()),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["shouldLimit"], serde_json::json!(true));
        assert_eq!(v["durationMinutes"], serde_json::json!(60));
    }
}
