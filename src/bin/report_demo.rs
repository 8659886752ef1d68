//! Demo that drives one report through the pipeline with scripted
//! collaborators (no real backend; set DISCORD_WEBHOOK_URL to see pushes).

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use chat_report_moderator::classifier::MockModeration;
use chat_report_moderator::config::MemoryKv;
use chat_report_moderator::enforce::{ActionDispatcher, AuthScope, DispatchCall};
use chat_report_moderator::{ChatPlatform, NotifierMux, PlatformMessage, ReportPipeline, ReportSession};

struct PrintingDispatcher;

#[async_trait::async_trait]
impl ActionDispatcher for PrintingDispatcher {
    async fn dispatch(&self, call: DispatchCall, _auth: AuthScope) -> Result<String> {
        println!("dispatch: {call:?}");
        Ok("ok".to_string())
    }
}

struct StaticPlatform;

#[async_trait::async_trait]
impl ChatPlatform for StaticPlatform {
    async fn fetch_message(&self, _guild_id: &str, _message_id: &str) -> Result<PlatformMessage> {
        Ok(PlatformMessage {
            sender_id: Some("target-user".to_string()),
            content: "demo offensive message".to_string(),
            ts: Some(Utc::now()),
        })
    }

    async fn user_authority(&self, _platform: &str, _user_id: &str) -> Result<u8> {
        Ok(1)
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let classifier = MockModeration::always(
        r#"{"level": 2, "reason": "personal attack", "actions": [{"type": "mute", "seconds": 1800}, {"type": "warn", "count": 1}]}"#,
    );

    let pipeline = ReportPipeline::new(
        Arc::new(MemoryKv::new()),
        Arc::new(classifier),
        Arc::new(PrintingDispatcher),
        Arc::new(StaticPlatform),
    )
    .with_notifier(NotifierMux::from_env());

    pipeline
        .update_config(|cfg| cfg.enabled = true)
        .await
        .expect("memory kv never fails");

    let session = ReportSession {
        platform: "demo".to_string(),
        guild_id: "demo-guild".to_string(),
        user_id: "reporter".to_string(),
        self_id: "bot".to_string(),
        message_id: "invoke-1".to_string(),
        quote_id: Some("reported-1".to_string()),
    };

    let reply = pipeline.handle_report(&session, true).await;
    println!("reply (quoted: {}):\n{}", reply.quoted, reply.text);
}
