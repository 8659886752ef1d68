//! config.rs — report-feature configuration and its persistence seam.
//!
//! One JSON document, stored under the `"report"` key of an external
//! key-value store, carries the global settings plus per-guild overrides.
//! Guild overrides layer over the global document; a guild without an entry
//! gets [`GuildReportConfig::default`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Key-value store key holding the serialized [`ReportConfig`].
pub const CONFIG_KEY: &str = "report";

/// Allowed context-size range for guild overrides.
pub const CONTEXT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 1..=20;

fn default_authority() -> u8 {
    1
}
fn default_true() -> bool {
    true
}
fn default_max_report_time() -> u32 {
    30
}
fn default_max_report_cooldown() -> u32 {
    60
}
fn default_min_authority_no_limit() -> u8 {
    2
}
fn default_context_size() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildReportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "autoProcess", default = "default_true")]
    pub auto_process: bool,
    #[serde(rename = "includeContext", default)]
    pub include_context: bool,
    #[serde(rename = "contextSize", default = "default_context_size")]
    pub context_size: u32,
}

impl Default for GuildReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_process: true,
            include_context: false,
            context_size: default_context_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Global feature switch; the command refuses to run while off.
    #[serde(default)]
    pub enabled: bool,
    /// Authority tier required to invoke the command at all (consulted by
    /// the external authorization engine, persisted here).
    #[serde(default = "default_authority")]
    pub authority: u8,
    /// Global auto-process default; guild overrides win.
    #[serde(rename = "autoProcess", default = "default_true")]
    pub auto_process: bool,
    /// Template overrides; `None` uses the built-in prompts.
    #[serde(rename = "defaultPromptTemplate", skip_serializing_if = "Option::is_none", default)]
    pub default_prompt: Option<String>,
    #[serde(rename = "contextPromptTemplate", skip_serializing_if = "Option::is_none", default)]
    pub context_prompt: Option<String>,
    /// Only messages younger than this may be reported (non-exempt users).
    #[serde(rename = "maxReportTimeMinutes", default = "default_max_report_time")]
    pub max_report_time_minutes: u32,
    /// Cooldown applied on failed or penalized reports.
    #[serde(rename = "maxReportCooldownMinutes", default = "default_max_report_cooldown")]
    pub max_report_cooldown_minutes: u32,
    /// Reporters at or above this authority are never cooled down.
    #[serde(rename = "minAuthorityNoLimit", default = "default_min_authority_no_limit")]
    pub min_authority_no_limit: u8,
    #[serde(rename = "guildConfigs", default)]
    pub guild_configs: HashMap<String, GuildReportConfig>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            authority: default_authority(),
            auto_process: true,
            default_prompt: None,
            context_prompt: None,
            max_report_time_minutes: default_max_report_time(),
            max_report_cooldown_minutes: default_max_report_cooldown(),
            min_authority_no_limit: default_min_authority_no_limit(),
            guild_configs: HashMap::new(),
        }
    }
}

impl ReportConfig {
    /// Effective per-guild settings: the stored override, else defaults
    /// inheriting the global auto-process flag.
    pub fn guild(&self, guild_id: &str) -> GuildReportConfig {
        self.guild_configs.get(guild_id).cloned().unwrap_or(GuildReportConfig {
            auto_process: self.auto_process,
            ..GuildReportConfig::default()
        })
    }

    /// Load from a TOML or JSON file (bootstrap for hosts without a store).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs_read(path)?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if ext == "toml" {
            toml::from_str(&content).map_err(|e| anyhow!("parsing {}: {e}", path.display()))
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))
        }
    }
}

fn fs_read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))
}

/// Validate a context-size override (1–20).
pub fn validate_context_size(size: u32) -> Result<u32> {
    if CONTEXT_SIZE_RANGE.contains(&size) {
        Ok(size)
    } else {
        Err(anyhow!(
            "context size must be between {} and {}",
            CONTEXT_SIZE_RANGE.start(),
            CONTEXT_SIZE_RANGE.end()
        ))
    }
}

// ------------------------------------------------------------
// Key-value persistence seam
// ------------------------------------------------------------

/// External persistent key-value storage (configuration, audit exports).
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn flush(&self) -> Result<()>;
}

/// Load the report config document from `kv`, falling back to defaults when
/// the key is absent or unreadable.
pub async fn load_config(kv: &dyn KvStore) -> ReportConfig {
    match kv.get(CONFIG_KEY).await {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("stored report config unreadable, using defaults: {e}");
            ReportConfig::default()
        }),
        Ok(None) => ReportConfig::default(),
        Err(e) => {
            tracing::warn!("config store read failed, using defaults: {e:#}");
            ReportConfig::default()
        }
    }
}

/// Persist the report config document to `kv`.
pub async fn save_config(kv: &dyn KvStore, config: &ReportConfig) -> Result<()> {
    let raw = serde_json::to_string(config).context("serializing report config")?;
    kv.set(CONFIG_KEY, &raw).await?;
    kv.flush().await
}

/// In-memory store for tests and demos.
#[derive(Default)]
pub struct MemoryKv {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().expect("kv mutex").get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .expect("kv mutex")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ReportConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.max_report_time_minutes, 30);
        assert_eq!(cfg.max_report_cooldown_minutes, 60);
        assert_eq!(cfg.min_authority_no_limit, 2);
        assert!(cfg.auto_process);
    }

    #[test]
    fn guild_falls_back_to_global_auto_process() {
        let cfg = ReportConfig {
            auto_process: false,
            ..ReportConfig::default()
        };
        let guild = cfg.guild("unset");
        assert!(guild.enabled);
        assert!(!guild.auto_process);
        assert_eq!(guild.context_size, 5);
    }

    #[test]
    fn guild_override_beats_global() {
        let mut cfg = ReportConfig::default();
        cfg.guild_configs.insert(
            "g1".to_string(),
            GuildReportConfig {
                enabled: false,
                include_context: true,
                context_size: 10,
                ..GuildReportConfig::default()
            },
        );
        let guild = cfg.guild("g1");
        assert!(!guild.enabled);
        assert!(guild.include_context);
        assert_eq!(guild.context_size, 10);
    }

    #[test]
    fn context_size_bounds() {
        assert!(validate_context_size(0).is_err());
        assert!(validate_context_size(1).is_ok());
        assert!(validate_context_size(20).is_ok());
        assert!(validate_context_size(21).is_err());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let cfg = ReportConfig::default();
        let v = serde_json::to_value(&cfg).unwrap();
        assert!(v.get("maxReportTimeMinutes").is_some());
        assert!(v.get("minAuthorityNoLimit").is_some());
        assert!(v.get("guildConfigs").is_some());
    }

    #[tokio::test]
    async fn round_trips_through_kv_store() {
        let kv = MemoryKv::new();
        let mut cfg = ReportConfig {
            enabled: true,
            ..ReportConfig::default()
        };
        cfg.guild_configs
            .insert("g1".to_string(), GuildReportConfig::default());

        save_config(&kv, &cfg).await.unwrap();
        let loaded = load_config(&kv).await;
        assert_eq!(loaded, cfg);
    }

    #[tokio::test]
    async fn missing_key_yields_defaults() {
        let kv = MemoryKv::new();
        assert_eq!(load_config(&kv).await, ReportConfig::default());
    }
}
