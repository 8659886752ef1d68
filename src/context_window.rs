//! context_window.rs — per-group sliding buffer of recent messages.
//!
//! The window gives the classifier situational context: banter that looks
//! hostile in isolation is often harmless inside its thread. Capacity is
//! deliberately over-provisioned to `2 × context_size` so a report issued
//! right after a burst still has a full window to sample from.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

/// One remembered inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMessage {
    pub user_id: String,
    pub content: String,
    pub ts: DateTime<Utc>,
}

/// In-memory, per-guild message buffers. Process-lifetime only.
#[derive(Debug, Default)]
pub struct ContextWindow {
    guilds: HashMap<String, VecDeque<ContextMessage>>,
}

impl ContextWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `message` for `guild_id`, evicting the oldest entries past
    /// the hard cap of `2 × context_size`. Callers skip this entirely for
    /// groups that have context collection disabled.
    pub fn append(&mut self, guild_id: &str, message: ContextMessage, context_size: usize) {
        let cap = context_size.max(1) * 2;
        let window = self.guilds.entry(guild_id.to_string()).or_default();
        window.push_back(message);
        while window.len() > cap {
            window.pop_front();
        }
    }

    /// The most recent `size` messages for `guild_id`, oldest first.
    pub fn snapshot(&self, guild_id: &str, size: usize) -> Vec<ContextMessage> {
        let Some(window) = self.guilds.get(guild_id) else {
            return Vec::new();
        };
        let mut messages: Vec<ContextMessage> = window.iter().cloned().collect();
        messages.sort_by_key(|m| m.ts);
        let start = messages.len().saturating_sub(size);
        messages.split_off(start)
    }

    #[cfg(test)]
    pub(crate) fn len(&self, guild_id: &str) -> usize {
        self.guilds.get(guild_id).map_or(0, VecDeque::len)
    }
}
