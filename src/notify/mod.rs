//! Push notifications for report outcomes.
//!
//! Fire-and-forget: a notifier failure is logged and swallowed, it must
//! never throw back into the report flow.

pub mod discord;

use anyhow::Result;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSeverity {
    Info,
    Warning,
    Error,
}

impl PushSeverity {
    pub fn text(self) -> &'static str {
        match self {
            PushSeverity::Info => "info",
            PushSeverity::Warning => "warning",
            PushSeverity::Error => "error",
        }
    }
}

/// One outcome summary pushed to subscribed observers.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub severity: PushSeverity,
    pub title: String,
    pub body: String,
    pub ts: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &NotificationEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Fan-out over all configured notifiers; errors are logged, never returned.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire up notifiers from the environment. Currently: Discord webhook
    /// via `DISCORD_WEBHOOK_URL`.
    pub fn from_env() -> Self {
        let mut mux = Self::new();
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                mux.push(Box::new(discord::DiscordNotifier::new(url)));
            }
        }
        mux
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.sinks.push(notifier);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn notify(&self, ev: &NotificationEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(ev).await {
                tracing::warn!(notifier = sink.name(), "push notification failed: {e:#}");
            }
        }
    }
}
