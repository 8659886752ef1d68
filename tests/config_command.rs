// tests/config_command.rs
// report-config command: scope rules, validation, persistence.

use std::sync::Arc;

use anyhow::Result;

use chat_report_moderator::classifier::MockModeration;
use chat_report_moderator::config::{KvStore, MemoryKv};
use chat_report_moderator::enforce::{ActionDispatcher, AuthScope, DispatchCall};
use chat_report_moderator::{
    ChatPlatform, ConfigOptions, ConfigScope, PlatformMessage, ReportPipeline,
};

struct NullPlatform;

#[async_trait::async_trait]
impl ChatPlatform for NullPlatform {
    async fn fetch_message(&self, _guild_id: &str, _message_id: &str) -> Result<PlatformMessage> {
        anyhow::bail!("not used here")
    }

    async fn user_authority(&self, _platform: &str, _user_id: &str) -> Result<u8> {
        Ok(1)
    }
}

struct NullDispatcher;

#[async_trait::async_trait]
impl ActionDispatcher for NullDispatcher {
    async fn dispatch(&self, _call: DispatchCall, _auth: AuthScope) -> Result<String> {
        anyhow::bail!("not used here")
    }
}

fn pipeline_on(kv: Arc<MemoryKv>) -> ReportPipeline {
    ReportPipeline::new(
        kv,
        Arc::new(MockModeration::always("{}")),
        Arc::new(NullDispatcher),
        Arc::new(NullPlatform),
    )
}

#[tokio::test]
async fn guild_scope_updates_and_reports_the_guild_entry() {
    let pipeline = pipeline_on(Arc::new(MemoryKv::new()));

    let reply = pipeline
        .handle_report_config(
            "admin",
            ConfigScope::Guild("g1".to_string()),
            &ConfigOptions {
                include_context: Some(true),
                context_size: Some(8),
                ..ConfigOptions::default()
            },
        )
        .await;

    assert!(reply.contains("Report configuration updated"));
    assert!(reply.contains("include context: yes"));
    assert!(reply.contains("context size: 8"));

    let guild = pipeline.config_snapshot().guild("g1");
    assert!(guild.include_context);
    assert_eq!(guild.context_size, 8);
}

#[tokio::test]
async fn no_options_shows_current_values_without_persisting() {
    let pipeline = pipeline_on(Arc::new(MemoryKv::new()));

    let reply = pipeline
        .handle_report_config(
            "admin",
            ConfigScope::Guild("g1".to_string()),
            &ConfigOptions::default(),
        )
        .await;

    // Read-only invocation prints defaults and is not an update.
    assert!(!reply.contains("updated"));
    assert!(reply.contains("enabled: yes"));
    assert!(reply.contains("context size: 5"));
    assert!(pipeline.audit().snapshot_last_n(10).is_empty());
}

#[tokio::test]
async fn authority_is_global_only_and_context_is_guild_only() {
    let pipeline = pipeline_on(Arc::new(MemoryKv::new()));

    let r1 = pipeline
        .handle_report_config(
            "admin",
            ConfigScope::Guild("g1".to_string()),
            &ConfigOptions {
                authority: Some(3),
                ..ConfigOptions::default()
            },
        )
        .await;
    assert!(r1.contains("global scope"));

    let r2 = pipeline
        .handle_report_config(
            "admin",
            ConfigScope::Global,
            &ConfigOptions {
                include_context: Some(true),
                ..ConfigOptions::default()
            },
        )
        .await;
    assert!(r2.contains("per group"));

    // Nothing changed on either rejected call.
    let cfg = pipeline.config_snapshot();
    assert_eq!(cfg.authority, 1);
    assert!(cfg.guild_configs.is_empty());
}

#[tokio::test]
async fn context_size_outside_bounds_is_rejected() {
    let pipeline = pipeline_on(Arc::new(MemoryKv::new()));

    for bad in [0u32, 21] {
        let reply = pipeline
            .handle_report_config(
                "admin",
                ConfigScope::Guild("g1".to_string()),
                &ConfigOptions {
                    context_size: Some(bad),
                    ..ConfigOptions::default()
                },
            )
            .await;
        assert!(reply.contains("1") && reply.contains("20"), "got: {reply}");
    }
    assert!(pipeline.config_snapshot().guild_configs.is_empty());
}

#[tokio::test]
async fn global_updates_persist_across_a_reload() {
    let kv = Arc::new(MemoryKv::new());
    let pipeline = pipeline_on(kv.clone());

    pipeline
        .handle_report_config(
            "admin",
            ConfigScope::Global,
            &ConfigOptions {
                enabled: Some(true),
                authority: Some(2),
                ..ConfigOptions::default()
            },
        )
        .await;

    // A fresh pipeline hydrated from the same store sees the changes.
    let reloaded = ReportPipeline::load(
        kv as Arc<dyn KvStore>,
        Arc::new(MockModeration::always("{}")),
        Arc::new(NullDispatcher),
        Arc::new(NullPlatform),
    )
    .await;
    let cfg = reloaded.config_snapshot();
    assert!(cfg.enabled);
    assert_eq!(cfg.authority, 2);
}

#[tokio::test]
async fn config_updates_are_audited() {
    let pipeline = pipeline_on(Arc::new(MemoryKv::new()));

    pipeline
        .handle_report_config(
            "admin",
            ConfigScope::Guild("g1".to_string()),
            &ConfigOptions {
                enabled: Some(false),
                ..ConfigOptions::default()
            },
        )
        .await;

    let events = pipeline.audit().snapshot_last_n(10);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].command, "report-config");
    assert_eq!(events[0].user_id, "admin");
}
