//! Application state wiring the cascade together.
//!
//! AppState holds the concrete orchestrator and store used by both the CLI
//! and the HTTP API. The orchestrator is generic over its authorities;
//! AppState pins it to the HTTP-backed ones from infra.

use std::sync::Arc;

use anyhow::Context;

use triage_core::llm::BoxLlmProvider;
use triage_core::orchestrator::CascadeOrchestrator;
use triage_infra::authority::{
    HelpCenterArticleAuthority, HttpReferenceValidator, SitemapListing, build_validator,
};
use triage_infra::config::resolve_api_key;
use triage_infra::llm::create_provider;
use triage_infra::store::InMemoryConversationStore;
use triage_types::config::GlobalConfig;

/// Orchestrator pinned to the infra authorities.
pub type ConcreteOrchestrator =
    CascadeOrchestrator<Option<HelpCenterArticleAuthority>, Option<SitemapListing>>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ConcreteOrchestrator,
    pub store: Arc<InMemoryConversationStore>,
    pub config: Arc<GlobalConfig>,
}

impl AppState {
    /// Build the provider and authorities from config.
    pub fn init(config: GlobalConfig) -> anyhow::Result<Self> {
        let api_key = resolve_api_key(&config.provider);
        let provider = create_provider(&config.provider, api_key).with_context(|| {
            format!(
                "could not create the '{}' provider (is {} set?)",
                config.provider.kind, config.provider.api_key_env
            )
        })?;
        let validator = build_validator(&config.validator)?;
        Ok(Self::new(config, provider, validator))
    }

    pub fn new(config: GlobalConfig, provider: BoxLlmProvider, validator: HttpReferenceValidator) -> Self {
        let orchestrator = CascadeOrchestrator::new(provider, validator, config.cascade.clone());
        Self {
            orchestrator,
            store: Arc::new(InMemoryConversationStore::new()),
            config: Arc::new(config),
        }
    }
}

/// State backed by a canned provider: the router answers "4" with high
/// confidence and the heavy agent says "The answer is 4.".
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use triage_core::validator::ReferenceValidator;

    let config = GlobalConfig::default();
    let validator = ReferenceValidator::new(None, None, &config.validator);
    AppState::new(config, BoxLlmProvider::new(tests::CannedProvider), validator)
}
