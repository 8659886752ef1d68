//! dedup.rs — cache of already-adjudicated messages.
//!
//! Once a report on a message is fully resolved (including "not in
//! violation"), repeat reports return the cached summary verbatim instead
//! of re-invoking the classifier or re-running enforcement.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Lifetime of a record; the sweep purges anything older.
const RECORD_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct ReportedMessageRecord {
    pub message_id: String,
    pub decided_at: DateTime<Utc>,
    pub result_summary: String,
}

/// In-memory per-(guild, message) adjudication cache. Process-lifetime only.
#[derive(Debug, Default)]
pub struct Deduplicator {
    records: HashMap<(String, String), ReportedMessageRecord>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result summary, if this message was already adjudicated.
    pub fn lookup(&self, guild_id: &str, message_id: &str) -> Option<&str> {
        self.records
            .get(&(guild_id.to_string(), message_id.to_string()))
            .map(|r| r.result_summary.as_str())
    }

    pub fn record(&mut self, guild_id: &str, message_id: &str, summary: &str, now: DateTime<Utc>) {
        self.records.insert(
            (guild_id.to_string(), message_id.to_string()),
            ReportedMessageRecord {
                message_id: message_id.to_string(),
                decided_at: now,
                result_summary: summary.to_string(),
            },
        );
    }

    /// Drop records older than 24 hours. Returns how many went.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let horizon = Duration::hours(RECORD_TTL_HOURS);
        self.records.retain(|_, r| now - r.decided_at <= horizon);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_recorded_summary_verbatim() {
        let mut d = Deduplicator::new();
        let now = Utc::now();
        d.record("g1", "m1", "handled (moderate violation)", now);
        assert_eq!(d.lookup("g1", "m1"), Some("handled (moderate violation)"));
        assert_eq!(d.lookup("g1", "m2"), None);
        assert_eq!(d.lookup("g2", "m1"), None);
    }

    #[test]
    fn sweep_purges_only_stale_records() {
        let mut d = Deduplicator::new();
        let now = Utc::now();
        d.record("g1", "old", "not in violation", now - Duration::hours(25));
        d.record("g1", "fresh", "not in violation", now - Duration::hours(1));

        assert_eq!(d.sweep(now), 1);
        assert!(d.lookup("g1", "old").is_none());
        assert!(d.lookup("g1", "fresh").is_some());
    }
}
