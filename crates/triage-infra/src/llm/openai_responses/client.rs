//! OpenAiResponsesProvider -- concrete [`LlmProvider`] for the OpenAI Responses API.
//!
//! Sends requests to `{base_url}/responses` with bearer authentication.
//! Supports both non-streaming (`complete`) and streaming (`stream`) modes.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use triage_core::llm::{LlmProvider, LlmStream};
use triage_observe::genai_attrs::PROVIDER_OPENAI;
use triage_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, ToolSpec};

use super::streaming::create_responses_stream;
use super::types::{
    InputMessage, ReasoningParam, ResponsesRequest, ResponsesResponse, TextFormat, TextParam,
    ToolParam, WebSearchFilters,
};

/// OpenAI Responses API provider.
///
/// Model names travel with each request, so one provider instance serves
/// both the router and the heavy stage.
pub struct OpenAiResponsesProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiResponsesProvider {
    /// Create a provider with the given request timeout.
    pub fn new(api_key: SecretString, base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/responses", self.base_url)
    }

    /// Convert a generic [`CompletionRequest`] into a [`ResponsesRequest`].
    pub(crate) fn to_responses_request(request: &CompletionRequest, stream: bool) -> ResponsesRequest {
        let input = request
            .messages
            .iter()
            .map(|m| InputMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        let format = request.output_config.as_ref().map(|config| TextFormat {
            type_field: config.format.type_field.clone(),
            name: config.format.json_schema.name.clone(),
            schema: config.format.json_schema.schema.clone(),
            strict: config.format.json_schema.strict,
        });
        let text = (request.verbosity.is_some() || format.is_some()).then(|| TextParam {
            verbosity: request.verbosity,
            format,
        });

        // Reasoning summaries only matter when someone is watching the stream.
        let reasoning = request.reasoning.map(|effort| ReasoningParam {
            effort,
            summary: stream.then(|| "auto".to_string()),
        });

        let tools = request
            .tools
            .iter()
            .map(|tool| match tool {
                ToolSpec::FileSearch {
                    vector_store_ids,
                    max_num_results,
                } => ToolParam::FileSearch {
                    vector_store_ids: vector_store_ids.clone(),
                    max_num_results: *max_num_results,
                },
                ToolSpec::WebSearch { allowed_domains } => ToolParam::WebSearch {
                    filters: (!allowed_domains.is_empty()).then(|| WebSearchFilters {
                        allowed_domains: allowed_domains.clone(),
                    }),
                },
            })
            .collect();

        ResponsesRequest {
            model: request.model.clone(),
            instructions: request.instructions.clone(),
            input,
            max_output_tokens: request.max_output_tokens,
            reasoning,
            text,
            tools,
            stream,
            store: false,
        }
    }
}

/// Map a non-success HTTP status to an [`LlmError`].
pub(crate) fn status_error(status: u16, retry_after_ms: Option<u64>, body: String) -> LlmError {
    match status {
        400 | 404 | 422 => LlmError::InvalidRequest(body),
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        503 => LlmError::Overloaded(body),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

/// `retry-after` header (seconds) in milliseconds.
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1_000)
}

// OpenAiResponsesProvider intentionally does NOT derive Debug.

impl LlmProvider for OpenAiResponsesProvider {
    fn name(&self) -> &str {
        PROVIDER_OPENAI
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = Self::to_responses_request(request, false);

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), retry_after, error_body));
        }

        let parsed: ResponsesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        if parsed.status.as_deref() == Some("failed") {
            let message = parsed
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "response failed".to_string());
            return Err(LlmError::Provider { message });
        }

        let stop_reason = parsed.stop_reason();
        if stop_reason == StopReason::ContentFilter {
            tracing::warn!(model = %parsed.model, "Response was refused or filtered");
        }

        Ok(CompletionResponse {
            content: parsed.output_text(),
            usage: parsed.usage(),
            stop_reason,
            id: parsed.id,
            model: parsed.model,
        })
    }

    fn stream(&self, request: CompletionRequest) -> LlmStream {
        let body = Self::to_responses_request(&request, true);
        create_responses_stream(&self.client, &self.url(), body, &self.api_key)
    }
}
