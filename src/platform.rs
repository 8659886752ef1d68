//! platform.rs — queries against the host chat platform.
//!
//! Group membership, message retrieval and authority levels live outside
//! this crate; the pipeline only needs the two calls below plus the
//! per-invocation session snapshot.

use anyhow::Result;
use chrono::{DateTime, Utc};

/// A message fetched from the platform by id.
#[derive(Debug, Clone)]
pub struct PlatformMessage {
    /// Sender, when the platform can determine one.
    pub sender_id: Option<String>,
    pub content: String,
    /// Send time, when the platform exposes one; the report-age window is
    /// only enforced when this is present.
    pub ts: Option<DateTime<Utc>>,
}

/// Per-invocation context of the report command.
#[derive(Debug, Clone)]
pub struct ReportSession {
    pub platform: String,
    pub guild_id: String,
    /// The reporter.
    pub user_id: String,
    /// The bot's own user id.
    pub self_id: String,
    /// Id of the invoking message (quoted back in replies).
    pub message_id: String,
    /// Id of the replied-to message being reported, if the invocation was a
    /// reply at all.
    pub quote_id: Option<String>,
}

#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Retrieve a message in `guild_id` by id.
    async fn fetch_message(&self, guild_id: &str, message_id: &str) -> Result<PlatformMessage>;

    /// Authority tier of `user_id` on `platform`. Used only for cooldown
    /// exemption; callers fall back to 1 when this fails.
    async fn user_authority(&self, platform: &str, user_id: &str) -> Result<u8>;
}
