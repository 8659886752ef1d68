//! cooldown.rs — ledger of reporters temporarily barred from reporting.
//!
//! A record is created when classification fails, an enforcement dispatch
//! throws, or the classifier itself rules that the reporter abused the
//! feature. Every lookup checks expiry on its own; the periodic sweep only
//! bounds memory.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

#[derive(Debug, Clone)]
pub struct CooldownRecord {
    pub user_id: String,
    pub guild_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

/// In-memory per-(user, guild) cooldown table. Process-lifetime only.
#[derive(Debug, Default)]
pub struct CooldownLedger {
    records: HashMap<(String, String), CooldownRecord>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining minutes (rounded up) if the reporter is blocked at `now`,
    /// `None` otherwise. Expired records are ignored lazily.
    pub fn is_blocked(&self, user_id: &str, guild_id: &str, now: DateTime<Utc>) -> Option<i64> {
        let record = self
            .records
            .get(&(user_id.to_string(), guild_id.to_string()))?;
        if now >= record.expires_at {
            return None;
        }
        let remaining = record.expires_at - now;
        // Ceil to whole minutes so "59 seconds left" still reads as 1 minute.
        let mut minutes = remaining.num_minutes();
        if remaining - Duration::minutes(minutes) > Duration::zero() {
            minutes += 1;
        }
        Some(minutes.max(1))
    }

    /// Bar `(user, guild)` from reporting for `duration_minutes`. Overwrites
    /// any existing record.
    pub fn block(
        &mut self,
        user_id: &str,
        guild_id: &str,
        duration_minutes: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        info!(
            user = user_id,
            guild = guild_id,
            minutes = duration_minutes,
            reason,
            "placing reporter under cooldown"
        );
        self.records.insert(
            (user_id.to_string(), guild_id.to_string()),
            CooldownRecord {
                user_id: user_id.to_string(),
                guild_id: guild_id.to_string(),
                created_at: now,
                expires_at: now + Duration::minutes(i64::from(duration_minutes)),
                reason: reason.to_string(),
            },
        );
    }

    /// Drop every record with `expires_at <= now`. Returns how many went.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.expires_at > now);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
