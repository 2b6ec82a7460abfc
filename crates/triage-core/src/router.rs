//! Router (triage) stage.
//!
//! One fast structured-output call that decides whether the router's own
//! answer can be served or the question must be escalated to the heavy
//! stage. Every failure mode resolves to escalation.

use std::time::Instant;

use tracing::{Instrument, debug, info_span, warn};

use triage_types::cascade::{CascadeContext, QuickReply, RouterDecision};
use triage_types::chat::ConversationTurn;
use triage_types::config::CascadeConfig;
use triage_types::error::CascadeError;
use triage_types::llm::{
    CompletionRequest, OutputConfig, Verbosity, add_additional_properties_false,
};
use triage_observe::genai_attrs as attrs;

use crate::buttons::contains_marker;
use crate::llm::BoxLlmProvider;
use crate::prompt::PromptBuilder;

/// Acknowledgement used when the router gave nothing suitable.
pub const GENERIC_QUICK_REPLY: &str =
    "Thanks for your question! Let me check our help center for the best answer.";

const DECISION_SCHEMA_NAME: &str = "router_decision";

/// What the cascade should do after routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Serve the router's own answer.
    Answer(String),
    /// Show the quick reply and run the heavy stage.
    Escalate(QuickReply),
}

/// Router result: the parsed decision (if any) and the route taken.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterOutcome {
    /// `None` when the call failed or its output was malformed.
    pub decision: Option<RouterDecision>,
    pub route: Route,
    pub elapsed_ms: u64,
}

impl RouterOutcome {
    pub fn is_escalation(&self) -> bool {
        matches!(self.route, Route::Escalate(_))
    }
}

/// Issues the triage call and applies the decision policy.
pub struct RouterStage<'a> {
    provider: &'a BoxLlmProvider,
    config: &'a CascadeConfig,
}

impl<'a> RouterStage<'a> {
    pub fn new(provider: &'a BoxLlmProvider, config: &'a CascadeConfig) -> Self {
        Self { provider, config }
    }

    /// Build the structured-output triage request.
    pub fn build_request(
        &self,
        context: &CascadeContext,
        history: &[ConversationTurn],
        question: &str,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.config.router_model.clone(),
            instructions: Some(PromptBuilder::router_instructions(self.config, context)),
            messages: PromptBuilder::messages(history, question, &[]),
            max_output_tokens: self.config.router_max_output_tokens,
            reasoning: Some(self.config.router_reasoning),
            verbosity: Some(Verbosity::Low),
            tools: Vec::new(),
            output_config: Some(decision_output_config()),
            stream: false,
        }
    }

    /// Run the triage call. Never fails: transport errors and malformed
    /// output become an escalation with the generic acknowledgement.
    pub async fn decide(
        &self,
        context: &CascadeContext,
        history: &[ConversationTurn],
        question: &str,
    ) -> RouterOutcome {
        let request = self.build_request(context, history, question);
        let started = Instant::now();

        let span = info_span!(
            "gen_ai.router",
            gen_ai.operation.name = attrs::OP_ROUTE,
            gen_ai.provider.name = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_output_tokens,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
        );
        let result = self
            .provider
            .complete(&request)
            .instrument(span.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Ok(response) = &result {
            span.record(attrs::GEN_AI_USAGE_INPUT_TOKENS, response.usage.input_tokens);
            span.record(attrs::GEN_AI_USAGE_OUTPUT_TOKENS, response.usage.output_tokens);
        }

        let decision = match result {
            Ok(response) => match parse_decision(&response.content) {
                Ok(decision) => Some(decision),
                Err(err) => {
                    warn!(error = %err, router_ms = elapsed_ms, "Router output malformed, escalating");
                    None
                }
            },
            Err(err) => {
                let err = CascadeError::from(err);
                warn!(error = %err, router_ms = elapsed_ms, "Router call failed, escalating");
                None
            }
        };

        let route = decide_route(decision.as_ref(), self.config);
        debug!(
            router_ms = elapsed_ms,
            escalate = matches!(route, Route::Escalate(_)),
            confidence = ?decision.as_ref().and_then(|d| d.confidence),
            "Router decided"
        );

        RouterOutcome {
            decision,
            route,
            elapsed_ms,
        }
    }
}

/// Structured output format constraining the router to [`RouterDecision`].
pub fn decision_output_config() -> OutputConfig {
    let mut schema = serde_json::to_value(schemars::schema_for!(RouterDecision))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
        map.remove("title");
    }
    add_additional_properties_false(&mut schema);
    require_all_properties(&mut schema);
    OutputConfig::strict_json_schema(DECISION_SCHEMA_NAME, schema)
}

/// Strict mode wants every property listed in `required`; optional fields
/// are expressed as nullable types instead.
fn require_all_properties(schema: &mut serde_json::Value) {
    let Some(map) = schema.as_object_mut() else {
        return;
    };
    let keys: Option<Vec<serde_json::Value>> = map
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|props| props.keys().cloned().map(serde_json::Value::String).collect());
    if let Some(keys) = keys {
        map.insert("required".to_string(), serde_json::Value::Array(keys));
    }
}

/// Parse and check the router's structured output.
pub fn parse_decision(content: &str) -> Result<RouterDecision, CascadeError> {
    let trimmed = strip_code_fence(content.trim());
    let decision: RouterDecision = serde_json::from_str(trimmed)
        .map_err(|e| CascadeError::MalformedDecision(e.to_string()))?;

    if let Some(confidence) = decision.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CascadeError::MalformedDecision(format!(
                "confidence {confidence} outside 0..=1"
            )));
        }
    }
    Ok(decision)
}

/// Some models wrap JSON in a markdown fence even under structured output.
fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Apply the decision policy.
pub fn decide_route(decision: Option<&RouterDecision>, config: &CascadeConfig) -> Route {
    match decision {
        Some(d) if d.is_trusted(config.router_confidence_threshold) && !d.answer.trim().is_empty() => {
            Route::Answer(d.answer.trim().to_string())
        }
        _ => Route::Escalate(quick_reply(decision, config.quick_reply_max_chars)),
    }
}

/// Reuse the router's wording as the acknowledgement when it reads like one.
pub fn quick_reply(decision: Option<&RouterDecision>, max_chars: usize) -> QuickReply {
    let candidate = decision.map(|d| d.answer.trim()).unwrap_or_default();
    let usable = !candidate.is_empty()
        && candidate.chars().count() <= max_chars
        && !candidate.contains("http://")
        && !candidate.contains("https://")
        && !candidate.contains("](")
        && !contains_marker(candidate);

    if usable {
        QuickReply {
            text: candidate.to_string(),
            from_router: true,
        }
    } else {
        QuickReply {
            text: GENERIC_QUICK_REPLY.to_string(),
            from_router: false,
        }
    }
}
