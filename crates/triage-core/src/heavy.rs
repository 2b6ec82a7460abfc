//! Heavy (escalation) stage.
//!
//! Produces the authoritative answer with the knowledge-base and web search
//! tools. In streaming mode the primary stream carries answer text only;
//! tool notices, reasoning summaries and progress markers are pushed onto
//! a side channel for the merger.

use tracing::{Instrument, info_span, warn};

use triage_observe::genai_attrs as attrs;
use triage_types::cascade::{CascadeContext, ImageAttachment};
use triage_types::chat::ConversationTurn;
use triage_types::config::CascadeConfig;
use triage_types::event::{CascadeEvent, ProgressStage, ToolStatus};
use triage_types::llm::{
    CompletionRequest, LlmError, Message, StopReason, StreamEvent, ToolSpec,
};

use crate::llm::BoxLlmProvider;
use crate::llm::span_stream::StreamInSpan;
use crate::merge::SideChannel;
use crate::prompt::PromptBuilder;

/// A piece of heavy-stage output.
#[derive(Debug, Clone, PartialEq)]
pub enum HeavyChunk {
    /// Visible answer text.
    Text(String),
    /// Advisory sub-event (tool, workflow, progress).
    Event(CascadeEvent),
}

/// Item type flowing through the heavy merge.
pub type HeavyItem = Result<HeavyChunk, LlmError>;

/// Inputs for one heavy attempt.
#[derive(Debug, Clone, Copy)]
pub struct HeavyInput<'a> {
    pub context: &'a CascadeContext,
    pub history: &'a [ConversationTurn],
    pub question: &'a str,
    pub attachments: &'a [ImageAttachment],
    /// Rejected answers and corrective feedback from earlier attempts.
    pub feedback: &'a [ConversationTurn],
}

/// Runs the tool-assisted answer call.
pub struct HeavyStage<'a> {
    provider: &'a BoxLlmProvider,
    config: &'a CascadeConfig,
}

impl<'a> HeavyStage<'a> {
    pub fn new(provider: &'a BoxLlmProvider, config: &'a CascadeConfig) -> Self {
        Self { provider, config }
    }

    /// Build the heavy request. Feedback turns go after the question.
    pub fn build_request(&self, input: &HeavyInput<'_>, stream: bool) -> CompletionRequest {
        let mut messages =
            PromptBuilder::messages(input.history, input.question, input.attachments);
        messages.extend(input.feedback.iter().map(Message::from));

        CompletionRequest {
            model: self.config.heavy_model.clone(),
            instructions: Some(PromptBuilder::heavy_instructions(self.config, input.context)),
            messages,
            max_output_tokens: self.config.heavy_max_output_tokens,
            reasoning: Some(self.config.heavy_reasoning),
            verbosity: Some(self.config.heavy_verbosity),
            tools: self.tools(),
            output_config: None,
            stream,
        }
    }

    fn tools(&self) -> Vec<ToolSpec> {
        let mut tools = Vec::with_capacity(2);
        if !self.config.vector_store_ids.is_empty() {
            tools.push(ToolSpec::FileSearch {
                vector_store_ids: self.config.vector_store_ids.clone(),
                max_num_results: self.config.vector_max_results.max(1),
            });
        }
        if !self.config.allowed_web_domains.is_empty() {
            tools.push(ToolSpec::WebSearch {
                allowed_domains: self.config.allowed_web_domains.clone(),
            });
        }
        tools
    }

    fn span(&self, request: &CompletionRequest, attempt: u32) -> tracing::Span {
        info_span!(
            "gen_ai.answer",
            gen_ai.operation.name = attrs::OP_ANSWER,
            gen_ai.provider.name = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_output_tokens,
            gen_ai.request.stream = request.stream,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            cascade.attempt = attempt,
        )
    }

    /// Single request/response call. No deltas, no sub-events.
    pub async fn complete(&self, input: &HeavyInput<'_>, attempt: u32) -> Result<String, LlmError> {
        let request = self.build_request(input, false);
        let span = self.span(&request, attempt);
        let response = self
            .provider
            .complete(&request)
            .instrument(span.clone())
            .await?;

        span.record(attrs::GEN_AI_RESPONSE_FINISH_REASONS, response.stop_reason.to_string());
        span.record(attrs::GEN_AI_USAGE_INPUT_TOKENS, response.usage.input_tokens);
        span.record(attrs::GEN_AI_USAGE_OUTPUT_TOKENS, response.usage.output_tokens);
        if response.stop_reason == StopReason::MaxTokens {
            warn!(attempt, "Heavy answer truncated at the output limit");
        }
        Ok(response.content)
    }

    /// Streamed call. The returned stream yields answer text; sub-events
    /// go to `side`. The stream ends after the provider's `Done` or on the
    /// first error.
    pub fn stream(
        &self,
        input: &HeavyInput<'_>,
        attempt: u32,
        side: SideChannel<HeavyItem>,
    ) -> impl futures_util::Stream<Item = HeavyItem> + Send + 'static {
        let request = self.build_request(input, true);
        let span = self.span(&request, attempt);
        let provider_stream = {
            let _enter = span.enter();
            self.provider.stream(request)
        };
        let mut events = StreamInSpan::new(provider_stream, span.clone());

        async_stream::stream! {
            use futures_util::StreamExt;

            let mut searching_announced = false;
            let mut generating_announced = false;
            let mut reasoning = String::new();

            let push = |event: CascadeEvent| {
                let _ = side.push(Ok(HeavyChunk::Event(event)));
            };

            while let Some(item) = events.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };

                if !matches!(event, StreamEvent::ReasoningDelta { .. }) && !reasoning.is_empty() {
                    push(CascadeEvent::Workflow {
                        step: std::mem::take(&mut reasoning).trim().to_string(),
                    });
                }

                match event {
                    StreamEvent::Connected => {}
                    StreamEvent::TextDelta { text } => {
                        if !generating_announced {
                            generating_announced = true;
                            push(CascadeEvent::Progress {
                                stage: ProgressStage::HeavyGenerating,
                            });
                        }
                        yield Ok(HeavyChunk::Text(text));
                    }
                    StreamEvent::ReasoningDelta { text } => reasoning.push_str(&text),
                    StreamEvent::ToolCallStarted { name, .. } => {
                        if !searching_announced {
                            searching_announced = true;
                            push(CascadeEvent::Progress {
                                stage: ProgressStage::HeavySearching,
                            });
                        }
                        push(CascadeEvent::Tool {
                            name,
                            status: ToolStatus::Started,
                            detail: None,
                        });
                    }
                    StreamEvent::ToolCallCompleted { name, detail, .. } => {
                        push(CascadeEvent::Tool {
                            name,
                            status: ToolStatus::Completed,
                            detail,
                        });
                    }
                    StreamEvent::MessageDelta { stop_reason } => {
                        span.record(attrs::GEN_AI_RESPONSE_FINISH_REASONS, stop_reason.to_string());
                        if stop_reason == StopReason::MaxTokens {
                            warn!(attempt, "Heavy answer truncated at the output limit");
                        }
                    }
                    StreamEvent::Usage(usage) => {
                        span.record(attrs::GEN_AI_USAGE_INPUT_TOKENS, usage.input_tokens);
                        span.record(attrs::GEN_AI_USAGE_OUTPUT_TOKENS, usage.output_tokens);
                    }
                    StreamEvent::Done => break,
                }
            }

            if !reasoning.is_empty() {
                push(CascadeEvent::Workflow {
                    step: reasoning.trim().to_string(),
                });
            }
        }
    }
}
