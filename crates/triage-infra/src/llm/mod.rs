//! LLM provider implementations.
//!
//! Contains the concrete implementation of the [`LlmProvider`] trait defined
//! in `triage-core` for the OpenAI Responses API, plus a provider factory
//! ([`create_provider`]) that builds it from a [`ProviderConfig`].
//!
//! [`LlmProvider`]: triage_core::llm::LlmProvider

pub mod openai_responses;

use std::time::Duration;

use secrecy::SecretString;

use triage_core::llm::BoxLlmProvider;
use triage_types::config::ProviderConfig;
use triage_types::llm::LlmError;

use self::openai_responses::OpenAiResponsesProvider;

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] when no API key is available
/// and [`LlmError::InvalidRequest`] for an unsupported provider kind.
pub fn create_provider(
    config: &ProviderConfig,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    match config.kind.as_str() {
        "openai" => {
            let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
            let provider = OpenAiResponsesProvider::new(
                key,
                &config.base_url,
                Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(BoxLlmProvider::new(provider))
        }
        other => Err(LlmError::InvalidRequest(format!(
            "unsupported provider kind '{other}'"
        ))),
    }
}
