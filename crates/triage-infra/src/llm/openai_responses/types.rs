//! Wire types for the OpenAI Responses API.

use serde::{Deserialize, Serialize};

use triage_types::llm::{ReasoningEffort, StopReason, Usage, Verbosity};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input: Vec<InputMessage>,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextParam>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolParam>,
    pub stream: bool,
    /// Responses are never stored server-side; history is resent each call.
    pub store: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningParam {
    pub effort: ReasoningEffort,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextParam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<TextFormat>,
}

/// `text.format` for structured output. The Responses API flattens the
/// schema descriptor into the format object.
#[derive(Debug, Clone, Serialize)]
pub struct TextFormat {
    #[serde(rename = "type")]
    pub type_field: String,
    pub name: String,
    pub schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolParam {
    FileSearch {
        vector_store_ids: Vec<String>,
        max_num_results: u32,
    },
    WebSearch {
        #[serde(skip_serializing_if = "Option::is_none")]
        filters: Option<WebSearchFilters>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchFilters {
    pub allowed_domains: Vec<String>,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FileSearchCall {
        id: String,
        #[serde(default)]
        queries: Vec<String>,
        #[serde(default)]
        results: Option<Vec<serde_json::Value>>,
    },
    WebSearchCall {
        id: String,
        #[serde(default)]
        action: Option<WebSearchAction>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchAction {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText { text: String },
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u32,
}

impl ResponsesResponse {
    /// Concatenated `output_text` parts of every message item.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content } => Some(content),
                _ => None,
            })
            .flatten()
            .filter_map(|part| match part {
                OutputContent::OutputText { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn stop_reason(&self) -> StopReason {
        let refused = self.output.iter().any(|item| {
            matches!(item, OutputItem::Message { content }
                if content.iter().any(|c| matches!(c, OutputContent::Refusal { .. })))
        });
        if refused {
            return StopReason::ContentFilter;
        }

        match self
            .incomplete_details
            .as_ref()
            .and_then(|d| d.reason.as_deref())
        {
            Some("max_output_tokens") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        }
    }

    pub fn usage(&self) -> Usage {
        self.usage
            .as_ref()
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                reasoning_tokens: u.output_tokens_details.as_ref().map(|d| d.reasoning_tokens),
            })
            .unwrap_or_default()
    }
}

impl OutputItem {
    /// `(id, tool name, detail)` for hosted tool calls; `None` otherwise.
    pub fn tool_call(&self) -> Option<(String, &'static str, Option<String>)> {
        match self {
            OutputItem::FileSearchCall { id, queries, results } => {
                let mut detail = Vec::new();
                if !queries.is_empty() {
                    detail.push(format!("queries: {}", queries.join("; ")));
                }
                if let Some(results) = results {
                    detail.push(format!("results: {}", results.len()));
                }
                let detail = (!detail.is_empty()).then(|| detail.join(", "));
                Some((id.clone(), "file_search", detail))
            }
            OutputItem::WebSearchCall { id, action } => {
                let detail = action
                    .as_ref()
                    .and_then(|a| a.query.as_ref())
                    .map(|q| format!("query: {q}"));
                Some((id.clone(), "web_search", detail))
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// Server-sent events of a streamed response. Unknown event types are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesStreamEvent {
    #[serde(rename = "response.created")]
    Created,

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },

    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryDelta { delta: String },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },

    #[serde(rename = "response.completed")]
    Completed { response: ResponsesResponse },

    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponsesResponse },

    #[serde(rename = "response.failed")]
    Failed { response: ResponsesResponse },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<String>,
        message: String,
    },

    #[serde(other)]
    Other,
}
