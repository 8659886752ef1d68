//! audit.rs — bounded in-memory log of every report outcome.
//!
//! Recording must never fail back into the report flow; the push side goes
//! through [`crate::notify::NotifierMux`], which swallows notifier errors.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Oldest entries are trimmed once this many are stored.
pub const AUDIT_CAP: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub guild_id: String,
    pub user_id: String,
    /// Event kind: report, report-handle, report-banned, report-no-action,
    /// report-error, report-config.
    pub command: String,
    pub target: String,
    pub details: String,
}

impl AuditEvent {
    pub fn new(
        guild_id: impl Into<String>,
        user_id: impl Into<String>,
        command: impl Into<String>,
        target: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            guild_id: guild_id.into(),
            user_id: user_id.into(),
            command: command.into(),
            target: target.into(),
            details: details.into(),
        }
    }
}

#[derive(Debug)]
pub struct AuditLogger {
    inner: Mutex<Vec<AuditEvent>>,
    cap: usize,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::with_capacity(AUDIT_CAP)
    }
}

impl AuditLogger {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            cap: cap.max(1),
        }
    }

    pub fn record(&self, event: AuditEvent) {
        let mut v = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        v.push(event);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<AuditEvent> {
        let v = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(i: usize) -> AuditEvent {
        AuditEvent::new("g1", "u1", "report", "u2", format!("entry {i}"))
    }

    #[test]
    fn trims_oldest_past_cap() {
        let log = AuditLogger::with_capacity(5);
        for i in 0..8 {
            log.record(ev(i));
        }
        assert_eq!(log.len(), 5);
        let snap = log.snapshot_last_n(5);
        assert_eq!(snap.first().unwrap().details, "entry 3");
        assert_eq!(snap.last().unwrap().details, "entry 7");
    }

    #[test]
    fn snapshot_last_n_is_bounded() {
        let log = AuditLogger::default();
        log.record(ev(0));
        assert_eq!(log.snapshot_last_n(10).len(), 1);
    }
}
