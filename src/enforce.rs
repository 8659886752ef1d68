//! enforce.rs — maps an assessment's action list onto the external
//! command dispatcher.
//!
//! Actions are dispatched in the order the classifier returned them; each
//! failure is caught and recorded without stopping the rest. Dispatch runs
//! under an explicit elevated authorization scope so the reporting user's
//! own permission level cannot block the enforcement commands — the scope
//! is a per-call parameter, never ambient session state, so nothing needs
//! restoring on exit.

use anyhow::Result;
use tracing::{error, warn};

use crate::assessment::{ViolationAction, ViolationAssessment, ViolationLevel};

/// Authorization context for one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScope {
    /// The caller's own permissions apply.
    Caller,
    /// Unconditional allow-all override, scoped to this call only.
    Elevated,
}

/// One concrete call against the external dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCall {
    Mute { user_id: String, duration: String },
    Warn { user_id: String, count: u32 },
    Kick { user_id: String, blacklist: bool },
}

/// Generic command/action execution surface provided by the host.
#[async_trait::async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, call: DispatchCall, auth: AuthScope) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub label: String,
    pub ok: bool,
}

/// Human-readable summary plus the per-action success/failure list.
#[derive(Debug, Clone)]
pub struct EnforcementResult {
    pub summary: String,
    pub outcomes: Vec<ActionOutcome>,
}

impl EnforcementResult {
    fn text_only(summary: String) -> Self {
        Self {
            summary,
            outcomes: Vec::new(),
        }
    }

    /// True when at least one action was attempted and every one failed.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.ok)
    }
}

/// Render mute seconds as a coarse unit string for the dispatcher.
pub fn format_mute_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h", seconds / 3600)
    } else {
        format!("{}d", seconds / 86_400)
    }
}

/// Execute `assessment` against `target_id` through `dispatcher`.
///
/// Level 0 and auto-process-off short-circuit without any dispatch; the
/// assessment's action list is otherwise executed as returned, including at
/// level 4 (the prompt tells the classifier only expel-and-ban is meaningful
/// there, and its list is trusted).
pub async fn execute(
    dispatcher: &dyn ActionDispatcher,
    assessment: &ViolationAssessment,
    target_id: &str,
    auto_process: bool,
    verbose: bool,
) -> EnforcementResult {
    let severity = assessment.level.text();

    if assessment.level == ViolationLevel::None {
        let summary = if verbose {
            format!(
                "AI verdict: not in violation\nReason: {}",
                assessment.reason
            )
        } else {
            "The message was not judged to be in violation.".to_string()
        };
        return EnforcementResult::text_only(summary);
    }

    if !auto_process {
        let summary = if verbose {
            format!(
                "AI verdict: {severity} violation\nReason: {}\nAction: auto-processing is disabled, flagged for manual review",
                assessment.reason
            )
        } else {
            format!("The message was judged a {severity} violation; flagged for manual review.")
        };
        return EnforcementResult::text_only(summary);
    }

    let mut outcomes = Vec::new();
    for action in &assessment.actions {
        let Some((call, done_label)) = plan(action, target_id) else {
            // Zero-valued mute/warn entries are no-ops by contract.
            warn!(action = %action.label(), "skipping no-op enforcement action");
            continue;
        };
        match dispatcher.dispatch(call, AuthScope::Elevated).await {
            Ok(_) => outcomes.push(ActionOutcome {
                label: done_label,
                ok: true,
            }),
            Err(e) => {
                error!(action = %action.label(), target = target_id, "enforcement dispatch failed: {e:#}");
                outcomes.push(ActionOutcome {
                    label: format!("{} failed", action.label()),
                    ok: false,
                });
            }
        }
    }

    let summary = if outcomes.is_empty() {
        if verbose {
            format!(
                "AI verdict: {severity} violation\nReason: {}\nAction: no automated remedy needed",
                assessment.reason
            )
        } else {
            format!("The message was judged a {severity} violation; no automated remedy needed.")
        }
    } else if outcomes.iter().all(|o| !o.ok) {
        format!(
            "The message was judged a {severity} violation, but automated handling failed; please handle it manually."
        )
    } else {
        let action_text = outcomes
            .iter()
            .map(|o| o.label.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if verbose {
            format!(
                "AI verdict: {severity} violation\nReason: {}\nActions: {action_text}",
                assessment.reason
            )
        } else {
            format!("Executed against user {target_id}: {action_text} ({severity} violation).")
        }
    };

    EnforcementResult { summary, outcomes }
}

/// Map one action to its dispatch call and success label. `None` for
/// zero-valued no-ops.
fn plan(action: &ViolationAction, target_id: &str) -> Option<(DispatchCall, String)> {
    match action {
        ViolationAction::Mute { seconds } => {
            if *seconds == 0 {
                return None;
            }
            let duration = format_mute_duration(*seconds);
            Some((
                DispatchCall::Mute {
                    user_id: target_id.to_string(),
                    duration,
                },
                format!("muted {seconds}s"),
            ))
        }
        ViolationAction::Warn { count } => {
            if *count == 0 {
                return None;
            }
            Some((
                DispatchCall::Warn {
                    user_id: target_id.to_string(),
                    count: *count,
                },
                format!("warned x{count}"),
            ))
        }
        ViolationAction::Expel => Some((
            DispatchCall::Kick {
                user_id: target_id.to_string(),
                blacklist: false,
            },
            "expelled".to_string(),
        )),
        ViolationAction::ExpelAndBan => Some((
            DispatchCall::Kick {
                user_id: target_id.to_string(),
                blacklist: true,
            },
            "expelled and banned".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records calls; fails every one when `fail_all` is set.
    struct RecordingDispatcher {
        calls: Mutex<Vec<(DispatchCall, AuthScope)>>,
        fail_all: bool,
    }

    impl RecordingDispatcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_all: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_all: true,
            }
        }

        fn calls(&self) -> Vec<(DispatchCall, AuthScope)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ActionDispatcher for RecordingDispatcher {
        async fn dispatch(&self, call: DispatchCall, auth: AuthScope) -> Result<String> {
            self.calls.lock().unwrap().push((call, auth));
            if self.fail_all {
                anyhow::bail!("dispatcher offline");
            }
            Ok("ok".to_string())
        }
    }

    fn assessment(level: ViolationLevel, actions: Vec<ViolationAction>) -> ViolationAssessment {
        ViolationAssessment {
            level,
            reason: "test reason".to_string(),
            actions,
            reporter_penalty: None,
        }
    }

    #[test]
    fn mute_duration_uses_coarse_units() {
        assert_eq!(format_mute_duration(45), "45s");
        assert_eq!(format_mute_duration(1800), "30m");
        assert_eq!(format_mute_duration(7200), "2h");
        assert_eq!(format_mute_duration(172_800), "2d");
    }

    #[tokio::test]
    async fn level_zero_dispatches_nothing_even_with_actions() {
        let d = RecordingDispatcher::new();
        let a = assessment(
            ViolationLevel::None,
            vec![ViolationAction::ExpelAndBan],
        );
        let r = execute(&d, &a, "u2", true, false).await;
        assert!(d.calls().is_empty());
        assert!(r.outcomes.is_empty());
        assert!(r.summary.contains("not judged to be in violation"));
    }

    #[tokio::test]
    async fn auto_process_off_flags_for_manual_review() {
        let d = RecordingDispatcher::new();
        let a = assessment(
            ViolationLevel::Severe,
            vec![ViolationAction::Expel],
        );
        let r = execute(&d, &a, "u2", false, false).await;
        assert!(d.calls().is_empty());
        assert!(r.summary.contains("manual review"));
        assert!(r.summary.contains("severe"));
    }

    #[tokio::test]
    async fn dispatches_actions_in_order_with_elevated_scope() {
        let d = RecordingDispatcher::new();
        let a = assessment(
            ViolationLevel::Moderate,
            vec![
                ViolationAction::Mute { seconds: 1800 },
                ViolationAction::Warn { count: 1 },
            ],
        );
        let r = execute(&d, &a, "u2", true, true).await;
        let calls = d.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].0,
            DispatchCall::Mute {
                user_id: "u2".to_string(),
                duration: "30m".to_string()
            }
        );
        assert_eq!(
            calls[1].0,
            DispatchCall::Warn {
                user_id: "u2".to_string(),
                count: 1
            }
        );
        assert!(calls.iter().all(|(_, auth)| *auth == AuthScope::Elevated));
        assert!(r.summary.contains("muted 1800s"));
        assert!(r.summary.contains("warned x1"));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        struct FailFirst {
            calls: Mutex<u32>,
        }
        #[async_trait::async_trait]
        impl ActionDispatcher for FailFirst {
            async fn dispatch(&self, _call: DispatchCall, _auth: AuthScope) -> Result<String> {
                let mut n = self.calls.lock().unwrap();
                *n += 1;
                if *n == 1 {
                    anyhow::bail!("first call fails");
                }
                Ok("ok".to_string())
            }
        }

        let d = FailFirst {
            calls: Mutex::new(0),
        };
        let a = assessment(
            ViolationLevel::Moderate,
            vec![
                ViolationAction::Mute { seconds: 60 },
                ViolationAction::Warn { count: 2 },
            ],
        );
        let r = execute(&d, &a, "u2", true, false).await;
        assert_eq!(r.outcomes.len(), 2);
        assert!(!r.outcomes[0].ok);
        assert!(r.outcomes[1].ok);
        assert!(!r.all_failed());
    }

    #[tokio::test]
    async fn all_failures_yield_manual_followup_summary() {
        let d = RecordingDispatcher::failing();
        let a = assessment(
            ViolationLevel::Severe,
            vec![ViolationAction::Expel],
        );
        let r = execute(&d, &a, "u2", true, false).await;
        assert!(r.all_failed());
        assert!(r.summary.contains("automated handling failed"));
    }

    #[tokio::test]
    async fn zero_valued_actions_are_skipped() {
        let d = RecordingDispatcher::new();
        let a = assessment(
            ViolationLevel::Minor,
            vec![
                ViolationAction::Mute { seconds: 0 },
                ViolationAction::Warn { count: 0 },
            ],
        );
        let r = execute(&d, &a, "u2", true, false).await;
        assert!(d.calls().is_empty());
        assert!(r.outcomes.is_empty());
        assert!(r.summary.contains("no automated remedy needed"));
    }

    #[tokio::test]
    async fn level_four_list_is_executed_as_returned() {
        let d = RecordingDispatcher::new();
        let a = assessment(
            ViolationLevel::Critical,
            vec![
                ViolationAction::Mute { seconds: 600 },
                ViolationAction::ExpelAndBan,
            ],
        );
        let r = execute(&d, &a, "u2", true, false).await;
        assert_eq!(d.calls().len(), 2);
        assert_eq!(r.outcomes.len(), 2);
    }
}
