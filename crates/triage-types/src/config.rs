//! Configuration types for the triage service.
//!
//! `GlobalConfig` represents the top-level `triage.toml`. Every field has a
//! serde default so an empty file (or no file) yields a working config.

use serde::{Deserialize, Serialize};

use crate::llm::{ReasoningEffort, Verbosity};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Knobs for one cascade invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default = "default_router_model")]
    pub router_model: String,
    #[serde(default = "default_heavy_model")]
    pub heavy_model: String,
    #[serde(default = "default_router_reasoning")]
    pub router_reasoning: ReasoningEffort,
    #[serde(default = "default_heavy_reasoning")]
    pub heavy_reasoning: ReasoningEffort,
    #[serde(default = "default_router_confidence_threshold")]
    pub router_confidence_threshold: f64,
    #[serde(default = "default_router_max_output_tokens")]
    pub router_max_output_tokens: u32,
    #[serde(default = "default_history_max_turns")]
    pub history_max_turns: usize,
    #[serde(default = "default_history_max_chars")]
    pub history_max_chars: usize,
    #[serde(default = "default_heavy_verbosity")]
    pub heavy_verbosity: Verbosity,
    #[serde(default = "default_true")]
    pub heavy_streaming_enabled: bool,
    /// Result count for the knowledge-base search tool. Values below 1 are
    /// clamped to 1 when the request is built.
    #[serde(default = "default_vector_max_results")]
    pub vector_max_results: u32,
    #[serde(default = "default_heavy_max_output_tokens")]
    pub heavy_max_output_tokens: u32,
    /// Heavy re-runs allowed after the first attempt when references fail validation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_quick_reply_max_chars")]
    pub quick_reply_max_chars: usize,
    #[serde(default)]
    pub vector_store_ids: Vec<String>,
    /// Domains the web search tool is restricted to. Empty disables web search.
    #[serde(default)]
    pub allowed_web_domains: Vec<String>,
    #[serde(default = "default_support_agent_name")]
    pub support_agent_name: String,
    /// Models a per-request override may select besides the configured ones.
    #[serde(default)]
    pub overridable_models: Vec<String>,
}

fn default_router_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_heavy_model() -> String {
    "gpt-5".to_string()
}

fn default_router_reasoning() -> ReasoningEffort {
    ReasoningEffort::Low
}

fn default_heavy_reasoning() -> ReasoningEffort {
    ReasoningEffort::Medium
}

fn default_router_confidence_threshold() -> f64 {
    0.75
}

fn default_router_max_output_tokens() -> u32 {
    600
}

fn default_history_max_turns() -> usize {
    12
}

fn default_history_max_chars() -> usize {
    8_000
}

fn default_heavy_verbosity() -> Verbosity {
    Verbosity::Medium
}

fn default_true() -> bool {
    true
}

fn default_vector_max_results() -> u32 {
    8
}

fn default_heavy_max_output_tokens() -> u32 {
    2_400
}

fn default_max_retries() -> u32 {
    1
}

fn default_quick_reply_max_chars() -> usize {
    280
}

fn default_support_agent_name() -> String {
    "Support Assistant".to_string()
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            router_model: default_router_model(),
            heavy_model: default_heavy_model(),
            router_reasoning: default_router_reasoning(),
            heavy_reasoning: default_heavy_reasoning(),
            router_confidence_threshold: default_router_confidence_threshold(),
            router_max_output_tokens: default_router_max_output_tokens(),
            history_max_turns: default_history_max_turns(),
            history_max_chars: default_history_max_chars(),
            heavy_verbosity: default_heavy_verbosity(),
            heavy_streaming_enabled: true,
            vector_max_results: default_vector_max_results(),
            heavy_max_output_tokens: default_heavy_max_output_tokens(),
            max_retries: default_max_retries(),
            quick_reply_max_chars: default_quick_reply_max_chars(),
            vector_store_ids: Vec::new(),
            allowed_web_domains: Vec::new(),
            support_agent_name: default_support_agent_name(),
            overridable_models: Vec::new(),
        }
    }
}

impl CascadeConfig {
    /// Maximum heavy-stage invocations for one cascade.
    pub fn max_heavy_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Apply a partial per-request override on top of this config.
    ///
    /// Overrides can only tighten the cost-bearing limits (retries, output
    /// tokens, search results, history budget): larger values are clamped to
    /// this config. Model overrides apply only for the configured models or
    /// those in `overridable_models`; others are ignored.
    pub fn with_overrides(&self, overrides: &CascadeConfigOverride) -> Self {
        let mut cfg = self.clone();
        if let Some(v) = overrides.router_model.as_ref().filter(|m| self.allows_model(m)) {
            cfg.router_model = v.clone();
        }
        if let Some(v) = overrides.heavy_model.as_ref().filter(|m| self.allows_model(m)) {
            cfg.heavy_model = v.clone();
        }
        if let Some(v) = overrides.router_reasoning {
            cfg.router_reasoning = v;
        }
        if let Some(v) = overrides.heavy_reasoning {
            cfg.heavy_reasoning = v;
        }
        if let Some(v) = overrides.router_confidence_threshold.filter(|v| !v.is_nan()) {
            cfg.router_confidence_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = overrides.history_max_turns {
            cfg.history_max_turns = v.min(self.history_max_turns);
        }
        if let Some(v) = overrides.history_max_chars {
            cfg.history_max_chars = v.min(self.history_max_chars);
        }
        if let Some(v) = overrides.heavy_verbosity {
            cfg.heavy_verbosity = v;
        }
        if let Some(v) = overrides.heavy_streaming_enabled {
            cfg.heavy_streaming_enabled = v;
        }
        if let Some(v) = overrides.vector_max_results {
            cfg.vector_max_results = v.min(self.vector_max_results);
        }
        if let Some(v) = overrides.heavy_max_output_tokens {
            cfg.heavy_max_output_tokens = v.min(self.heavy_max_output_tokens);
        }
        if let Some(v) = overrides.max_retries {
            cfg.max_retries = v.min(self.max_retries);
        }
        cfg
    }

    fn allows_model(&self, model: &str) -> bool {
        model == self.router_model
            || model == self.heavy_model
            || self.overridable_models.iter().any(|m| m == model)
    }
}

/// Partial cascade config accepted per request. Unset fields keep the
/// server's configured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfigOverride {
    pub router_model: Option<String>,
    pub heavy_model: Option<String>,
    pub router_reasoning: Option<ReasoningEffort>,
    pub heavy_reasoning: Option<ReasoningEffort>,
    pub router_confidence_threshold: Option<f64>,
    pub history_max_turns: Option<usize>,
    pub history_max_chars: Option<usize>,
    pub heavy_verbosity: Option<Verbosity>,
    pub heavy_streaming_enabled: Option<bool>,
    pub vector_max_results: Option<u32>,
    pub heavy_max_output_tokens: Option<u32>,
    pub max_retries: Option<u32>,
}

/// Reference validator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Host whose links are validated, e.g. `help.example.com`. Subdomains match too.
    #[serde(default = "default_support_domain")]
    pub support_domain: String,
    /// Base URL of the help-center API. `None` disables the article authority.
    #[serde(default)]
    pub help_center_base_url: Option<String>,
    /// Sitemap listing every published page. `None` disables the listing authority.
    #[serde(default)]
    pub sitemap_url: Option<String>,
    #[serde(default = "default_reference_cache_ttl_secs")]
    pub reference_cache_ttl_secs: u64,
    #[serde(default = "default_sitemap_cache_ttl_secs")]
    pub sitemap_cache_ttl_secs: u64,
}

fn default_support_domain() -> String {
    "help.example.com".to_string()
}

fn default_reference_cache_ttl_secs() -> u64 {
    3_600
}

fn default_sitemap_cache_ttl_secs() -> u64 {
    86_400
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            support_domain: default_support_domain(),
            help_center_base_url: None,
            sitemap_url: None,
            reference_cache_ttl_secs: default_reference_cache_ttl_secs(),
            sitemap_cache_ttl_secs: default_sitemap_cache_ttl_secs(),
        }
    }
}

/// Model provider connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type. Only `"openai"` (Responses API) is supported.
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider_kind() -> String {
    "openai".to_string()
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: default_provider_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
