//! pipeline.rs — orchestration of the report and report-config commands.
//!
//! One report moves through: cooldown check → self/target validation →
//! duplicate check → time-window check → prompt construction →
//! classification → parsing → enforcement → cooldown/penalty update →
//! audit write → reply. Cooldown and duplicate checks run strictly before
//! the classification await, and the dedup record is written as soon as the
//! assessment is decoded, so two reports racing on the same message cannot
//! both reach the classifier.
//!
//! All shared state is guarded by `std::sync::Mutex` and every guard is
//! dropped before the next await point.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::assessment::ViolationLevel;
use crate::audit::{AuditEvent, AuditLogger};
use crate::classifier::ModerationClient;
use crate::config::{
    load_config, save_config, validate_context_size, GuildReportConfig, KvStore, ReportConfig,
};
use crate::context_window::{ContextMessage, ContextWindow};
use crate::cooldown::CooldownLedger;
use crate::dedup::Deduplicator;
use crate::enforce::{self, ActionDispatcher};
use crate::notify::{NotificationEvent, NotifierMux, PushSeverity};
use crate::parser::parse_assessment;
use crate::platform::{ChatPlatform, ReportSession};
use crate::prompt::build_prompt;

/// Reply sent back to the invoking user. `quoted` asks the host to prefix
/// a quote of the invoking message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReply {
    pub text: String,
    pub quoted: bool,
}

impl ReportReply {
    fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }
}

/// Scope of a report-config invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Guild(String),
}

/// Options accepted by the report-config command. `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub enabled: Option<bool>,
    pub auto_process: Option<bool>,
    /// Authority threshold; global scope only.
    pub authority: Option<u8>,
    pub include_context: Option<bool>,
    pub context_size: Option<u32>,
}

pub struct ReportPipeline {
    kv: Arc<dyn KvStore>,
    classifier: Arc<dyn ModerationClient>,
    dispatcher: Arc<dyn ActionDispatcher>,
    platform: Arc<dyn ChatPlatform>,
    config: Mutex<ReportConfig>,
    cooldowns: Mutex<CooldownLedger>,
    dedup: Mutex<Deduplicator>,
    context: Mutex<ContextWindow>,
    audit: AuditLogger,
    notifier: NotifierMux,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ReportPipeline {
    pub fn new(
        kv: Arc<dyn KvStore>,
        classifier: Arc<dyn ModerationClient>,
        dispatcher: Arc<dyn ActionDispatcher>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Self {
        Self {
            kv,
            classifier,
            dispatcher,
            platform,
            config: Mutex::new(ReportConfig::default()),
            cooldowns: Mutex::new(CooldownLedger::new()),
            dedup: Mutex::new(Deduplicator::new()),
            context: Mutex::new(ContextWindow::new()),
            audit: AuditLogger::default(),
            notifier: NotifierMux::new(),
        }
    }

    /// Like [`ReportPipeline::new`] but hydrates the configuration from the
    /// key-value store first.
    pub async fn load(
        kv: Arc<dyn KvStore>,
        classifier: Arc<dyn ModerationClient>,
        dispatcher: Arc<dyn ActionDispatcher>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Self {
        let config = load_config(kv.as_ref()).await;
        let pipeline = Self::new(kv, classifier, dispatcher, platform);
        *lock(&pipeline.config) = config;
        pipeline
    }

    pub fn with_notifier(mut self, notifier: NotifierMux) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config_snapshot(&self) -> ReportConfig {
        lock(&self.config).clone()
    }

    /// Mutate the configuration and persist it. Mainly for host bootstrap;
    /// user-driven changes go through [`ReportPipeline::handle_report_config`].
    pub async fn update_config<F: FnOnce(&mut ReportConfig)>(&self, f: F) -> anyhow::Result<()> {
        let updated = {
            let mut cfg = lock(&self.config);
            f(&mut cfg);
            cfg.clone()
        };
        save_config(self.kv.as_ref(), &updated).await
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Cooldown status of a reporter; exposed for hosts that surface it.
    pub fn reporter_cooldown(&self, user_id: &str, guild_id: &str) -> Option<i64> {
        lock(&self.cooldowns).is_blocked(user_id, guild_id, Utc::now())
    }

    // ------------------------------------------------------------
    // Message intake (context collection)
    // ------------------------------------------------------------

    /// Append an inbound group message to the context window. No-op when
    /// the group has context collection disabled.
    pub fn observe_message(&self, guild_id: &str, user_id: &str, content: &str) {
        if guild_id.is_empty() || content.is_empty() {
            return;
        }
        let guild = lock(&self.config).guild(guild_id);
        if !guild.include_context {
            return;
        }
        lock(&self.context).append(
            guild_id,
            ContextMessage {
                user_id: user_id.to_string(),
                content: content.to_string(),
                ts: Utc::now(),
            },
            guild.context_size as usize,
        );
    }

    // ------------------------------------------------------------
    // Command: report
    // ------------------------------------------------------------

    pub async fn handle_report(&self, session: &ReportSession, verbose: bool) -> ReportReply {
        let config = self.config_snapshot();

        if !config.enabled {
            return ReportReply::quoted("The report feature is disabled.");
        }
        if session.guild_id.is_empty() {
            return ReportReply::quoted("This command can only be used inside a group.");
        }
        let guild = config.guild(&session.guild_id);
        if !guild.enabled {
            return ReportReply::quoted("Reporting is disabled in this group.");
        }

        let authority = match self
            .platform
            .user_authority(&session.platform, &session.user_id)
            .await
        {
            Ok(a) => a,
            Err(e) => {
                error!(user = %session.user_id, "authority lookup failed: {e:#}");
                1
            }
        };
        let exempt = authority >= config.min_authority_no_limit;
        let now = Utc::now();

        if !exempt {
            let blocked = lock(&self.cooldowns).is_blocked(&session.user_id, &session.guild_id, now);
            if let Some(minutes) = blocked {
                return ReportReply::quoted(format!(
                    "You are temporarily barred from reporting due to prior misuse; try again in {minutes} minute(s)."
                ));
            }
        }

        let Some(quote_id) = session.quote_id.clone() else {
            return ReportReply::quoted(
                "Reply to the message you want to report, then invoke the command.",
            );
        };

        let cached = lock(&self.dedup)
            .lookup(&session.guild_id, &quote_id)
            .map(str::to_string);
        if let Some(summary) = cached {
            return ReportReply::quoted(format!(
                "This message has already been reported; result: {summary}"
            ));
        }

        let message = match self
            .platform
            .fetch_message(&session.guild_id, &quote_id)
            .await
        {
            Ok(m) if !m.content.is_empty() => m,
            Ok(_) | Err(_) => {
                return ReportReply::quoted("Could not retrieve the reported message content.");
            }
        };

        let Some(target_id) = message.sender_id.clone().filter(|s| !s.is_empty()) else {
            return ReportReply::quoted("Could not determine the sender of the reported message.");
        };
        if target_id == session.user_id {
            return ReportReply::quoted("You cannot report your own message.");
        }
        if target_id == session.self_id {
            return ReportReply::quoted("You cannot report the bot's message.");
        }

        self.audit.record(AuditEvent::new(
            &session.guild_id,
            &session.user_id,
            "report",
            &target_id,
            format!("reported content: {}", shorten(&message.content)),
        ));

        if !exempt {
            if let Some(ts) = message.ts {
                let max_age = Duration::minutes(i64::from(config.max_report_time_minutes));
                if now - ts > max_age {
                    return ReportReply::quoted(format!(
                        "Only messages from the last {} minutes can be reported; this one is too old.",
                        config.max_report_time_minutes
                    ));
                }
            }
        }

        // Build the prompt; the context snapshot is taken synchronously.
        let context = if guild.include_context {
            Some(lock(&self.context).snapshot(&session.guild_id, guild.context_size as usize))
        } else {
            None
        };
        let template = if context.is_some() {
            config.context_prompt.as_deref()
        } else {
            config.default_prompt.as_deref()
        };
        let prompt = build_prompt(&message.content, context.as_deref(), template);

        let raw = match self.classifier.classify(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(guild = %session.guild_id, "classification call failed: {e:#}");
                return self
                    .classification_failed(session, &config, exempt, "classifier call failed")
                    .await;
            }
        };

        let assessment = match parse_assessment(&raw) {
            Ok(a) => a,
            Err(e) => {
                error!(guild = %session.guild_id, raw, "classifier response unusable: {e}");
                return self
                    .classification_failed(session, &config, exempt, "classifier response unusable")
                    .await;
            }
        };

        // Adjudicated: record the dedup entry before any further await so a
        // racing duplicate report short-circuits from here on.
        let cache_summary = if assessment.level == ViolationLevel::None {
            "not in violation".to_string()
        } else {
            format!("handled ({} violation)", assessment.level.text())
        };
        lock(&self.dedup).record(&session.guild_id, &quote_id, &cache_summary, Utc::now());

        let result = enforce::execute(
            self.dispatcher.as_ref(),
            &assessment,
            &target_id,
            guild.auto_process,
            verbose,
        )
        .await;

        let mut reply_text = result.summary.clone();

        // Classifier-driven reporter penalty (never for exempt reporters).
        if let Some(penalty) = &assessment.reporter_penalty {
            if penalty.should_limit && !exempt {
                let minutes = penalty.duration_minutes.unwrap_or(60);
                let reason = penalty
                    .reason
                    .clone()
                    .unwrap_or_else(|| "reporting abuse".to_string());
                lock(&self.cooldowns).block(
                    &session.user_id,
                    &session.guild_id,
                    minutes,
                    &reason,
                    Utc::now(),
                );
                self.audit.record(AuditEvent::new(
                    &session.guild_id,
                    &session.user_id,
                    "report-banned",
                    &session.user_id,
                    format!("AI verdict: {reason}, barred for {minutes} minutes"),
                ));
                reply_text.push_str(&format!(
                    "\nAI reasoning: {}\nYou have been barred from reporting for {minutes} minutes: {reason}",
                    assessment.reason
                ));
            }
        }

        // Audit + push; neither may fail the flow.
        let action_text = if result.outcomes.is_empty() {
            "none".to_string()
        } else {
            result
                .outcomes
                .iter()
                .map(|o| o.label.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        if assessment.level == ViolationLevel::None {
            self.audit.record(AuditEvent::new(
                &session.guild_id,
                &session.user_id,
                "report-no-action",
                &target_id,
                "not in violation",
            ));
        } else if !guild.auto_process {
            self.audit.record(AuditEvent::new(
                &session.guild_id,
                &session.user_id,
                "report-no-action",
                &target_id,
                format!("{} violation, awaiting manual review", assessment.level.text()),
            ));
        } else {
            self.audit.record(AuditEvent::new(
                &session.guild_id,
                &session.user_id,
                "report-handle",
                &target_id,
                format!(
                    "{} violation, handled: {action_text}, content: {}",
                    assessment.level.text(),
                    shorten(&message.content)
                ),
            ));

            let (severity, title) = if result.all_failed() {
                (PushSeverity::Error, "report enforcement failed")
            } else {
                (PushSeverity::Warning, "report handled")
            };
            self.notifier
                .notify(&NotificationEvent {
                    severity,
                    title: title.to_string(),
                    body: format!(
                        "guild {} user {} - {} violation\ncontent: {}\nhandled: {action_text}",
                        session.guild_id,
                        target_id,
                        assessment.level.text(),
                        shorten(&message.content)
                    ),
                    ts: Utc::now(),
                })
                .await;
        }

        info!(
            guild = %session.guild_id,
            reporter = %session.user_id,
            target = %target_id,
            level = assessment.level.text(),
            "report adjudicated"
        );

        ReportReply::quoted(reply_text)
    }

    /// Terminal path for classifier transport failures and unparseable
    /// responses; both penalize the reporter the same way and are never
    /// retried.
    async fn classification_failed(
        &self,
        session: &ReportSession,
        config: &ReportConfig,
        exempt: bool,
        why: &str,
    ) -> ReportReply {
        if !exempt {
            lock(&self.cooldowns).block(
                &session.user_id,
                &session.guild_id,
                config.max_report_cooldown_minutes,
                why,
                Utc::now(),
            );
            self.audit.record(AuditEvent::new(
                &session.guild_id,
                &session.user_id,
                "report-banned",
                &session.user_id,
                format!("report processing failed ({why}), reporter barred"),
            ));
        }

        self.audit.record(AuditEvent::new(
            &session.guild_id,
            &session.user_id,
            "report-error",
            &session.user_id,
            why,
        ));
        self.notifier
            .notify(&NotificationEvent {
                severity: PushSeverity::Error,
                title: "report processing failed".to_string(),
                body: format!(
                    "guild {} reporter {} - {why}",
                    session.guild_id, session.user_id
                ),
                ts: Utc::now(),
            })
            .await;

        ReportReply::quoted(
            "Report processing failed: the AI verdict could not be obtained. Please try again later or contact an administrator.",
        )
    }

    // ------------------------------------------------------------
    // Command: report-config
    // ------------------------------------------------------------

    pub async fn handle_report_config(
        &self,
        actor_id: &str,
        scope: ConfigScope,
        opts: &ConfigOptions,
    ) -> String {
        let mut lines = Vec::new();
        let mut changed = false;

        let updated = {
            let mut cfg = lock(&self.config);
            match &scope {
                ConfigScope::Guild(guild_id) => {
                    if opts.authority.is_some() {
                        return "The authority threshold can only be set at global scope."
                            .to_string();
                    }
                    if let Some(size) = opts.context_size {
                        if let Err(e) = validate_context_size(size) {
                            return e.to_string();
                        }
                    }

                    lines.push(format!("Report configuration for group {guild_id}:"));
                    let entry = cfg
                        .guild_configs
                        .entry(guild_id.clone())
                        .or_insert_with(GuildReportConfig::default);

                    if let Some(v) = opts.enabled {
                        entry.enabled = v;
                        changed = true;
                    }
                    if let Some(v) = opts.auto_process {
                        entry.auto_process = v;
                        changed = true;
                    }
                    if let Some(v) = opts.include_context {
                        entry.include_context = v;
                        changed = true;
                    }
                    if let Some(v) = opts.context_size {
                        entry.context_size = v;
                        changed = true;
                    }

                    lines.push(format!(
                        "enabled: {}",
                        if entry.enabled { "yes" } else { "no" }
                    ));
                    lines.push(format!(
                        "auto-process: {}",
                        if entry.auto_process { "yes" } else { "no" }
                    ));
                    lines.push(format!(
                        "include context: {}",
                        if entry.include_context { "yes" } else { "no" }
                    ));
                    lines.push(format!("context size: {}", entry.context_size));
                }
                ConfigScope::Global => {
                    if opts.include_context.is_some() || opts.context_size.is_some() {
                        return "Context options are set per group; pass a group scope."
                            .to_string();
                    }

                    lines.push("Global report configuration:".to_string());
                    if let Some(v) = opts.enabled {
                        cfg.enabled = v;
                        changed = true;
                    }
                    if let Some(v) = opts.auto_process {
                        cfg.auto_process = v;
                        changed = true;
                    }
                    if let Some(v) = opts.authority {
                        cfg.authority = v;
                        changed = true;
                    }

                    lines.push(format!("enabled: {}", if cfg.enabled { "yes" } else { "no" }));
                    lines.push(format!(
                        "auto-process: {}",
                        if cfg.auto_process { "yes" } else { "no" }
                    ));
                    lines.push(format!("authority threshold: {}", cfg.authority));
                }
            }
            cfg.clone()
        };

        if changed {
            let scope_text = match &scope {
                ConfigScope::Global => "global".to_string(),
                ConfigScope::Guild(g) => g.clone(),
            };
            if let Err(e) = save_config(self.kv.as_ref(), &updated).await {
                warn!("persisting report config failed: {e:#}");
                return format!("Configuration updated in memory but could not be persisted: {e}");
            }
            self.audit.record(AuditEvent::new(
                match &scope {
                    ConfigScope::Guild(g) => g.as_str(),
                    ConfigScope::Global => "",
                },
                actor_id,
                "report-config",
                &scope_text,
                "report configuration updated",
            ));
            return format!("Report configuration updated\n{}", lines.join("\n"));
        }

        lines.join("\n")
    }

    // ------------------------------------------------------------
    // Expiry sweep
    // ------------------------------------------------------------

    /// Purge expired cooldown and dedup entries. Returns the removal counts;
    /// correctness never depends on this, it only bounds memory.
    pub fn sweep(&self) -> (usize, usize) {
        let now = Utc::now();
        let cooldowns = lock(&self.cooldowns).sweep(now);
        let dedup = lock(&self.dedup).sweep(now);
        (cooldowns, dedup)
    }
}

/// Trim long message content for audit entries and notifications.
fn shorten(content: &str) -> String {
    const MAX: usize = 30;
    let mut out: String = content.chars().take(MAX).collect();
    if content.chars().nth(MAX).is_some() {
        out.push_str("...");
    }
    out
}
