//! classifier.rs — moderation backend abstraction + concrete providers.
//!
//! The pipeline treats classification as an opaque function from prompt to
//! raw text; it may fail or return malformed output, and both cases resolve
//! to the same terminal outcome upstream. No retry lives here or anywhere
//! else in the crate.

use std::sync::Mutex;
use std::time::Duration;
use std::{env, fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Opaque content-classification capability.
#[async_trait::async_trait]
pub trait ModerationClient: Send + Sync {
    /// Send `prompt` and return the raw response text.
    async fn classify(&self, prompt: &str) -> Result<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}

/// Backend config, loaded from `config/moderation.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub enabled: bool,
    /// "openai" (or any OpenAI-compatible endpoint via `api_url`).
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl ModerationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path)
            .with_context(|| format!("reading moderation config {}", path.as_ref().display()))?;
        let mut cfg: ModerationConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.to_lowercase();
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("Missing OPENAI_API_KEY env var"))?,
                other => bail!("Unsupported provider in config: {other}"),
            };
        }
        Ok(cfg)
    }
}

/// Convenient alias used by callers.
pub type DynModerationClient = std::sync::Arc<dyn ModerationClient>;

/// Factory: build a client according to config and environment.
///
/// * If `MODERATION_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled == false`, returns a disabled client.
/// * Else builds the real OpenAI-compatible provider.
pub fn build_client_from_config(config: &ModerationConfig) -> DynModerationClient {
    if env::var("MODERATION_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return std::sync::Arc::new(MockModeration::always(
            r#"{"level": 0, "reason": "mock verdict", "actions": []}"#,
        ));
    }
    if !config.enabled {
        return std::sync::Arc::new(DisabledModeration);
    }
    std::sync::Arc::new(OpenAiModeration::new(config.clone()))
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiModeration {
    http: reqwest::Client,
    config: ModerationConfig,
}

impl OpenAiModeration {
    pub fn new(config: ModerationConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("chat-report-moderator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http, config }
    }
}

#[async_trait::async_trait]
impl ModerationClient for OpenAiModeration {
    async fn classify(&self, prompt: &str) -> Result<String> {
        if self.config.api_key.is_empty() {
            bail!("moderation backend has no API key configured");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.config.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&req)
            .send()
            .await
            .context("moderation request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("moderation backend returned HTTP {status}");
        }

        let body: Resp = resp.json().await.context("moderation response body")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        if content.is_empty() {
            bail!("moderation backend returned an empty response");
        }
        Ok(content.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always errors; used when moderation is disabled in config.
pub struct DisabledModeration;

#[async_trait::async_trait]
impl ModerationClient for DisabledModeration {
    async fn classify(&self, _prompt: &str) -> Result<String> {
        bail!("moderation backend is disabled")
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Scripted provider for tests and local runs. Pops queued responses in
/// order, repeating the last one, and counts how often it was called.
pub struct MockModeration {
    responses: Mutex<Vec<Result<String, String>>>,
    calls: Mutex<u32>,
    last_prompt: Mutex<Option<String>>,
}

impl MockModeration {
    pub fn always(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    pub fn failing(message: &str) -> Self {
        Self::scripted(vec![Err(message.to_string())])
    }

    /// Queue of responses consumed front to back; the last is sticky.
    pub fn scripted(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("mock call counter")
    }

    /// The prompt of the most recent call, for assertions.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().expect("mock last prompt").clone()
    }
}

#[async_trait::async_trait]
impl ModerationClient for MockModeration {
    async fn classify(&self, prompt: &str) -> Result<String> {
        *self.calls.lock().expect("mock call counter") += 1;
        *self.last_prompt.lock().expect("mock last prompt") = Some(prompt.to_string());
        let mut q = self.responses.lock().expect("mock responses");
        let next = if q.len() > 1 {
            q.remove(0)
        } else {
            q.first().cloned().unwrap_or(Err("mock exhausted".to_string()))
        };
        next.map_err(|m| anyhow!(m))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn factory_test_mode_overrides_config() {
        let cfg = ModerationConfig {
            enabled: true,
            provider: "openai".to_string(),
            api_key: "sk-real".to_string(),
            model: default_model(),
            api_url: default_api_url(),
            max_tokens: default_max_tokens(),
        };

        env::set_var("MODERATION_TEST_MODE", "mock");
        let client = build_client_from_config(&cfg);
        env::remove_var("MODERATION_TEST_MODE");
        assert_eq!(client.provider_name(), "mock");

        let client = build_client_from_config(&cfg);
        assert_eq!(client.provider_name(), "openai");
    }

    #[test]
    #[serial_test::serial]
    fn factory_disabled_config_yields_disabled_client() {
        env::remove_var("MODERATION_TEST_MODE");
        let cfg = ModerationConfig {
            enabled: false,
            provider: "openai".to_string(),
            api_key: String::new(),
            model: default_model(),
            api_url: default_api_url(),
            max_tokens: default_max_tokens(),
        };
        let client = build_client_from_config(&cfg);
        assert_eq!(client.provider_name(), "disabled");
    }

    #[tokio::test]
    async fn disabled_client_always_errors() {
        assert!(DisabledModeration.classify("anything").await.is_err());
    }

    #[tokio::test]
    async fn scripted_mock_pops_in_order_and_last_is_sticky() {
        let mock = MockModeration::scripted(vec![
            Ok("first".to_string()),
            Err("second fails".to_string()),
            Ok("third".to_string()),
        ]);
        assert_eq!(mock.classify("p1").await.unwrap(), "first");
        assert!(mock.classify("p2").await.is_err());
        assert_eq!(mock.classify("p3").await.unwrap(), "third");
        assert_eq!(mock.classify("p4").await.unwrap(), "third");
        assert_eq!(mock.call_count(), 4);
        assert_eq!(mock.last_prompt().as_deref(), Some("p4"));
    }
}
