//! Cascade orchestrator.
//!
//! `CascadeOrchestrator` runs one invocation end to end: router, optional
//! escalation to the heavy stage, reference validation with bounded
//! retries, and the outbound event protocol. The cascade body runs as a
//! single future that reports ordered signals over a channel; the driver
//! polls that channel (biased) alongside the body and relays signals to
//! the caller's [`EventSink`]. Nothing is spawned; every invocation is one
//! logical task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};

use triage_types::cascade::{
    ButtonSuggestion, CascadeRequest, CascadeResult, CascadeSource, CascadeTimings,
    ValidationSummary,
};
use triage_types::chat::ConversationTurn;
use triage_types::config::CascadeConfig;
use triage_types::error::CascadeError;
use triage_types::event::{CascadeEvent, ProgressStage};
use triage_types::llm::LlmError;

use crate::buttons::{MarkerFilter, extract_buttons};
use crate::heavy::{HeavyChunk, HeavyInput, HeavyStage};
use crate::history::trim_history;
use crate::llm::BoxLlmProvider;
use crate::merge::{merge_with_side_channel, side_channel};
use crate::prompt::PromptBuilder;
use crate::router::{Route, RouterOutcome, RouterStage};
use crate::state::{CascadeState, StateMachine};
use crate::validator::extract::strip_links;
use crate::validator::{ArticleAuthority, ReferenceListing, ReferenceValidator};

/// Terminal answer after an unrecoverable failure.
pub const APOLOGY_MESSAGE: &str = "Sorry, something went wrong while I was looking into this. \
Would you like me to connect you with a member of our support team?";

/// Outbound event channel for one invocation.
///
/// Emitting to a sink whose receiver is gone is a no-op; the first such
/// attempt is logged at debug.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<CascadeEvent>>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CascadeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// A sink that discards everything.
    pub fn noop() -> Self {
        Self {
            tx: None,
            closed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns whether the event was delivered.
    pub fn emit(&self, event: CascadeEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        if tx.send(event).is_ok() {
            return true;
        }
        if !self.closed.swap(true, Ordering::Relaxed) {
            debug!("Event sink closed, further cascade events are dropped");
        }
        false
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

/// Ordered signals from the cascade body to the driver.
#[derive(Debug)]
enum Signal {
    RouterDecided(RouterOutcome),
    Event(CascadeEvent),
}

struct Signals(mpsc::UnboundedSender<Signal>);

impl Signals {
    fn router_decided(&self, outcome: RouterOutcome) {
        let _ = self.0.send(Signal::RouterDecided(outcome));
    }

    fn event(&self, event: CascadeEvent) {
        let _ = self.0.send(Signal::Event(event));
    }

    fn progress(&self, stage: ProgressStage) {
        self.event(CascadeEvent::Progress { stage });
    }
}

/// Outcome of the escalation branch.
struct Escalation {
    answer: String,
    buttons: Vec<ButtonSuggestion>,
    heavy_ms: u64,
    validation: ValidationSummary,
    degraded: bool,
}

/// Last answer rejected for invalid references, kept as the fallback when a
/// later attempt fails in transport.
struct RejectedAnswer {
    answer: String,
    buttons: Vec<ButtonSuggestion>,
    invalid_urls: Vec<String>,
}

/// Runs cascade invocations. Cheap to clone; clones share the provider,
/// validator caches and base config.
pub struct CascadeOrchestrator<A, L> {
    provider: Arc<BoxLlmProvider>,
    validator: Arc<ReferenceValidator<A, L>>,
    config: Arc<CascadeConfig>,
}

impl<A, L> Clone for CascadeOrchestrator<A, L> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            validator: Arc::clone(&self.validator),
            config: Arc::clone(&self.config),
        }
    }
}

impl<A, L> CascadeOrchestrator<A, L>
where
    A: ArticleAuthority + 'static,
    L: ReferenceListing + 'static,
{
    pub fn new(
        provider: BoxLlmProvider,
        validator: ReferenceValidator<A, L>,
        config: CascadeConfig,
    ) -> Self {
        Self {
            provider: Arc::new(provider),
            validator: Arc::new(validator),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn validator(&self) -> &ReferenceValidator<A, L> {
        &self.validator
    }

    /// Run one invocation with the base config.
    pub async fn run(&self, request: CascadeRequest, sink: EventSink) -> CascadeResult {
        let config = Arc::clone(&self.config);
        self.run_with_config(request, &config, sink).await
    }

    /// Run one invocation with an explicit config (e.g., per-request overrides).
    ///
    /// Always returns a result: failures resolve to escalation, permissive
    /// validation, a stripped best answer, or the apology. `Final` is the
    /// last event emitted to `sink`.
    pub async fn run_with_config(
        &self,
        request: CascadeRequest,
        config: &CascadeConfig,
        sink: EventSink,
    ) -> CascadeResult {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signals = Signals(tx);

        let span = info_span!(
            "cascade",
            question_chars = request.question.chars().count(),
            history_turns = request.history.len(),
        );
        let body = self.cascade(&request, config, &signals).instrument(span);
        let mut body = std::pin::pin!(body);

        sink.emit(CascadeEvent::Progress {
            stage: ProgressStage::Initial,
        });

        let mut router_seen = false;
        let result = loop {
            tokio::select! {
                biased;
                Some(signal) = rx.recv() => relay(signal, &sink, &mut router_seen, false),
                result = &mut body => break result,
            }
        };

        // The body finished; flush whatever it queued after the last poll.
        while let Ok(signal) = rx.try_recv() {
            relay(signal, &sink, &mut router_seen, true);
        }

        sink.emit(CascadeEvent::Progress {
            stage: ProgressStage::Complete,
        });
        sink.emit(CascadeEvent::Final {
            result: result.clone(),
        });
        result
    }

    /// Run one invocation as a stream of events ending with `Final`.
    pub fn stream(&self, request: CascadeRequest) -> impl Stream<Item = CascadeEvent> + Send + 'static {
        let config = (*self.config).clone();
        self.stream_with_config(request, config)
    }

    pub fn stream_with_config(
        &self,
        request: CascadeRequest,
        config: CascadeConfig,
    ) -> impl Stream<Item = CascadeEvent> + Send + 'static {
        let this = self.clone();
        async_stream::stream! {
            let (sink, mut rx) = EventSink::channel();
            let run = this.run_with_config(request, &config, sink);
            let mut run = std::pin::pin!(run);
            let mut finished = false;

            loop {
                let next = tokio::select! {
                    biased;
                    event = rx.recv() => event,
                    _ = &mut run, if !finished => {
                        finished = true;
                        continue;
                    }
                };
                match next {
                    Some(event) => yield event,
                    None => break,
                }
            }
        }
    }

    async fn cascade(
        &self,
        request: &CascadeRequest,
        config: &CascadeConfig,
        signals: &Signals,
    ) -> CascadeResult {
        let started = Instant::now();
        let mut machine = StateMachine::new();

        signals.progress(ProgressStage::Analyzing);
        let history = trim_history(
            &request.history,
            config.history_max_turns,
            config.history_max_chars,
        );

        signals.progress(ProgressStage::RouterProcessing);
        let routed = RouterStage::new(&self.provider, config)
            .decide(&request.context, &history, &request.question)
            .await;
        let router_ms = routed.elapsed_ms;
        let decision = routed.decision.clone();
        let route = routed.route.clone();
        signals.router_decided(routed);

        match route {
            Route::Answer(answer) => {
                machine.advance(CascadeState::Answered);
                let (answer, buttons) = extract_buttons(&answer);
                machine.advance(CascadeState::Complete);
                let total_ms = started.elapsed().as_millis() as u64;
                info!(router_ms, total_ms, source = "router", "Cascade complete");

                CascadeResult {
                    source: CascadeSource::Router,
                    answer,
                    buttons,
                    timings: CascadeTimings {
                        router_ms,
                        heavy_ms: None,
                        total_ms,
                    },
                    router: decision,
                    validation: ValidationSummary::default(),
                    degraded: false,
                }
            }
            Route::Escalate(_) => {
                machine.advance(CascadeState::Escalated);
                let escalation = self
                    .escalate(request, config, &history, signals, &mut machine)
                    .await;
                let total_ms = started.elapsed().as_millis() as u64;
                info!(
                    router_ms,
                    heavy_ms = escalation.heavy_ms,
                    total_ms,
                    heavy_attempts = escalation.validation.heavy_attempts,
                    degraded = escalation.degraded,
                    source = "heavy",
                    "Cascade complete"
                );

                CascadeResult {
                    source: CascadeSource::Heavy,
                    answer: escalation.answer,
                    buttons: escalation.buttons,
                    timings: CascadeTimings {
                        router_ms,
                        heavy_ms: Some(escalation.heavy_ms),
                        total_ms,
                    },
                    router: decision,
                    validation: escalation.validation,
                    degraded: escalation.degraded,
                }
            }
        }
    }

    /// Heavy stage plus the validation/retry loop. At most
    /// `config.max_heavy_attempts()` heavy calls.
    async fn escalate(
        &self,
        request: &CascadeRequest,
        config: &CascadeConfig,
        history: &[ConversationTurn],
        signals: &Signals,
        machine: &mut StateMachine,
    ) -> Escalation {
        let max_attempts = config.max_heavy_attempts();
        let mut feedback: Vec<ConversationTurn> = Vec::new();
        let mut rejected: Option<RejectedAnswer> = None;
        let mut heavy_ms = 0u64;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            signals.progress(ProgressStage::HeavyPending);

            let input = HeavyInput {
                context: &request.context,
                history,
                question: &request.question,
                attachments: &request.attachments,
                feedback: &feedback,
            };
            let attempt_started = Instant::now();
            let produced = self.heavy_attempt(config, &input, attempt, signals).await;
            heavy_ms += attempt_started.elapsed().as_millis() as u64;

            let raw = match produced {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    warn!(attempt, "Heavy stage returned an empty answer");
                    return fallback(rejected, attempt, heavy_ms, machine);
                }
                Err(err) => {
                    let err = CascadeError::from(err);
                    error!(error = %err, attempt, "Heavy stage failed");
                    return fallback(rejected, attempt, heavy_ms, machine);
                }
            };

            let (answer, buttons) = extract_buttons(&raw);
            machine.advance(CascadeState::Validating);
            let outcome = self.validator.validate(&answer).await;

            if !outcome.has_invalid() {
                machine.advance(CascadeState::Complete);
                return Escalation {
                    answer,
                    buttons,
                    heavy_ms,
                    validation: ValidationSummary {
                        heavy_attempts: attempt,
                        ..Default::default()
                    },
                    degraded: false,
                };
            }

            let invalid_urls = outcome.invalid_urls();
            if attempt >= max_attempts {
                warn!(
                    attempt,
                    invalid = invalid_urls.len(),
                    "Retry budget exhausted, stripping invalid links"
                );
                machine.advance(CascadeState::Complete);
                return Escalation {
                    answer: strip_links(&answer, &invalid_urls),
                    buttons,
                    heavy_ms,
                    validation: ValidationSummary {
                        heavy_attempts: attempt,
                        stripped_references: invalid_urls,
                        retry_budget_exhausted: true,
                    },
                    degraded: false,
                };
            }

            machine.advance(CascadeState::Retrying);
            info!(
                attempt,
                invalid = invalid_urls.len(),
                "Answer cites unknown references, retrying"
            );
            signals.event(CascadeEvent::Retry {
                attempt: attempt + 1,
                invalid_references: invalid_urls.clone(),
            });

            feedback.push(ConversationTurn::assistant(answer.clone()));
            feedback.push(ConversationTurn::user(PromptBuilder::reference_feedback(
                &outcome.invalid_references,
            )));
            rejected = Some(RejectedAnswer {
                answer,
                buttons,
                invalid_urls,
            });
        }
    }

    /// One heavy call. Streams deltas (marker filtered) and sub-events to
    /// `signals` and returns the full raw text.
    async fn heavy_attempt(
        &self,
        config: &CascadeConfig,
        input: &HeavyInput<'_>,
        attempt: u32,
        signals: &Signals,
    ) -> Result<String, LlmError> {
        let stage = HeavyStage::new(&self.provider, config);

        if !config.heavy_streaming_enabled {
            signals.progress(ProgressStage::HeavySearching);
            return stage.complete(input, attempt).await;
        }

        let (side, side_rx) = side_channel();
        let merged = merge_with_side_channel(stage.stream(input, attempt, side), side_rx);
        let mut merged = std::pin::pin!(merged);
        let mut filter = MarkerFilter::new();
        let mut text = String::new();

        while let Some(item) = merged.next().await {
            match item? {
                HeavyChunk::Text(delta) => {
                    text.push_str(&delta);
                    let visible = filter.push(&delta);
                    if !visible.is_empty() {
                        signals.event(CascadeEvent::Delta { text: visible });
                    }
                }
                HeavyChunk::Event(event) => signals.event(event),
            }
        }

        let tail = filter.finish();
        if !tail.is_empty() {
            signals.event(CascadeEvent::Delta { text: tail });
        }
        Ok(text)
    }
}

/// Resolve a failed heavy attempt: the previous rejected answer with its
/// invalid links stripped if there is one, otherwise the apology.
fn fallback(
    rejected: Option<RejectedAnswer>,
    attempt: u32,
    heavy_ms: u64,
    machine: &mut StateMachine,
) -> Escalation {
    machine.advance(CascadeState::Complete);
    match rejected {
        Some(previous) => Escalation {
            answer: strip_links(&previous.answer, &previous.invalid_urls),
            buttons: previous.buttons,
            heavy_ms,
            validation: ValidationSummary {
                heavy_attempts: attempt,
                stripped_references: previous.invalid_urls,
                retry_budget_exhausted: false,
            },
            degraded: false,
        },
        None => Escalation {
            answer: APOLOGY_MESSAGE.to_string(),
            buttons: Vec::new(),
            heavy_ms,
            validation: ValidationSummary {
                heavy_attempts: attempt,
                ..Default::default()
            },
            degraded: true,
        },
    }
}

/// Translate one body signal into outbound events.
///
/// A router answer first seen after the body already finished goes
/// straight to `Final` without a `router_decided` marker.
fn relay(signal: Signal, sink: &EventSink, router_seen: &mut bool, body_done: bool) {
    match signal {
        Signal::RouterDecided(outcome) => {
            *router_seen = true;
            match outcome.route {
                Route::Answer(_) if body_done => {}
                Route::Answer(_) => {
                    sink.emit(CascadeEvent::Progress {
                        stage: ProgressStage::RouterDecided,
                    });
                }
                Route::Escalate(quick_reply) => {
                    sink.emit(CascadeEvent::Progress {
                        stage: ProgressStage::RouterDecided,
                    });
                    sink.emit(CascadeEvent::Acknowledgement {
                        quick_reply,
                        decision: outcome.decision,
                    });
                }
            }
        }
        Signal::Event(event) => {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::GENERIC_QUICK_REPLY;
    use crate::testing::{FixedArticles, FixedListing, Script, ScriptedProvider};
    use triage_types::cascade::QuickReply;
    use triage_types::config::ValidatorConfig;

    const FAKE_LINK: &str = "https://help.example.com/hc/en-us/articles/999";
    const REAL_LINK: &str = "https://help.example.com/hc/en-us/articles/123";

    fn router_reply(handoff: bool, confidence: f64, answer: &str) -> Script {
        Script::Text(
            serde_json::json!({
                "handoff": handoff,
                "answer": answer,
                "reason": "test",
                "confidence": confidence,
                "follow_up_needed": false,
            })
            .to_string(),
        )
    }

    fn escalate() -> Script {
        router_reply(true, 0.3, "Let me look into exporting for you.")
    }

    fn orchestrator(
        scripted: ScriptedProvider,
        articles: FixedArticles,
        config: CascadeConfig,
    ) -> CascadeOrchestrator<FixedArticles, FixedListing> {
        let validator =
            ReferenceValidator::new(articles, FixedListing::default(), &ValidatorConfig::default());
        CascadeOrchestrator::new(BoxLlmProvider::new(scripted), validator, config)
    }

    fn request(question: &str) -> CascadeRequest {
        CascadeRequest {
            question: question.to_string(),
            ..Default::default()
        }
    }

    async fn run_collect(
        orch: &CascadeOrchestrator<FixedArticles, FixedListing>,
        request: CascadeRequest,
    ) -> (Vec<CascadeEvent>, CascadeResult) {
        let (sink, mut rx) = EventSink::channel();
        let result = orch.run(request, sink).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (events, result)
    }

    fn acknowledgements(events: &[CascadeEvent]) -> Vec<&QuickReply> {
        events
            .iter()
            .filter_map(|e| match e {
                CascadeEvent::Acknowledgement { quick_reply, .. } => Some(quick_reply),
                _ => None,
            })
            .collect()
    }

    fn deltas(events: &[CascadeEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                CascadeEvent::Delta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn assert_final_last(events: &[CascadeEvent], result: &CascadeResult) {
        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);
        match events.last() {
            Some(CascadeEvent::Final { result: last }) => assert_eq!(last, result),
            other => panic!("expected final last, got {other:?}"),
        }
        assert_eq!(
            events[events.len() - 2],
            CascadeEvent::Progress {
                stage: ProgressStage::Complete
            }
        );
        assert_eq!(
            events[0],
            CascadeEvent::Progress {
                stage: ProgressStage::Initial
            }
        );
    }

    #[tokio::test]
    async fn test_confident_router_answers_without_heavy_call() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, router_reply(false, 0.95, "2 + 2 = 4."));
        let orch = orchestrator(scripted.clone(), FixedArticles::default(), cfg.clone());

        let (events, result) = run_collect(&orch, request("What is 2+2?")).await;

        assert_eq!(result.source, CascadeSource::Router);
        assert_eq!(result.answer, "2 + 2 = 4.");
        assert!(result.buttons.is_empty());
        assert!(result.timings.heavy_ms.is_none());
        assert_eq!(result.validation.heavy_attempts, 0);
        assert!(!result.degraded);
        assert!(scripted.requests_for(&cfg.heavy_model).is_empty());
        assert!(acknowledgements(&events).is_empty());
        assert_final_last(&events, &result);
    }

    #[tokio::test]
    async fn test_escalation_acknowledges_once_before_answer() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(
                &cfg.heavy_model,
                Script::Text("Open Reports and choose Export to download a CSV.".to_string()),
            );
        let orch = orchestrator(scripted.clone(), FixedArticles::default(), cfg.clone());

        let (events, result) = run_collect(&orch, request("How do I export my reports?")).await;

        assert_eq!(result.source, CascadeSource::Heavy);
        assert_eq!(result.answer, "Open Reports and choose Export to download a CSV.");
        assert_eq!(result.validation.heavy_attempts, 1);
        assert!(result.timings.heavy_ms.is_some());
        assert!(result.router.as_ref().is_some_and(|d| d.handoff));

        let acks = acknowledgements(&events);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].text, "Let me look into exporting for you.");
        assert!(acks[0].from_router);

        let ack_at = events
            .iter()
            .position(|e| matches!(e, CascadeEvent::Acknowledgement { .. }))
            .unwrap();
        let first_delta = events
            .iter()
            .position(|e| matches!(e, CascadeEvent::Delta { .. }))
            .unwrap();
        assert!(ack_at < first_delta);
        assert_eq!(deltas(&events).trim(), result.answer);
        assert_final_last(&events, &result);
    }

    #[tokio::test]
    async fn test_fabricated_link_retried_once() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(
                &cfg.heavy_model,
                Script::Text(format!("See [Export guide]({FAKE_LINK}) for details.")),
            )
            .script(
                &cfg.heavy_model,
                Script::Text(format!("See [Export guide]({REAL_LINK}) for details.")),
            );
        let orch = orchestrator(scripted.clone(), FixedArticles::with(&[123]), cfg.clone());

        let (events, result) = run_collect(&orch, request("How do I export?")).await;

        assert_eq!(result.validation.heavy_attempts, 2);
        assert!(result.answer.contains(REAL_LINK));
        assert!(!result.validation.retry_budget_exhausted);
        assert!(result.validation.stripped_references.is_empty());

        let retries: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                CascadeEvent::Retry {
                    attempt,
                    invalid_references,
                } => Some((*attempt, invalid_references.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![(2, vec![FAKE_LINK.to_string()])]);

        let heavy = scripted.requests_for(&cfg.heavy_model);
        assert_eq!(heavy.len(), 2);
        let feedback = heavy[1].messages.last().unwrap();
        assert!(feedback.content.contains(FAKE_LINK));
        assert!(heavy[1].messages.len() > heavy[0].messages.len());
        assert_final_last(&events, &result);
    }

    #[tokio::test]
    async fn test_persistent_invalid_links_stop_at_budget_and_are_stripped() {
        let cfg = CascadeConfig::default();
        let fake = format!("See [Export guide]({FAKE_LINK}) for details.");
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(&cfg.heavy_model, Script::Text(fake.clone()))
            .script(&cfg.heavy_model, Script::Text(fake.clone()))
            .script(&cfg.heavy_model, Script::Text(fake));
        let orch = orchestrator(scripted.clone(), FixedArticles::with(&[123]), cfg.clone());

        let (_, result) = run_collect(&orch, request("How do I export?")).await;

        assert_eq!(scripted.requests_for(&cfg.heavy_model).len(), 2);
        assert_eq!(result.validation.heavy_attempts, 2);
        assert!(result.validation.retry_budget_exhausted);
        assert_eq!(result.validation.stripped_references, vec![FAKE_LINK.to_string()]);
        assert_eq!(result.answer, "See Export guide for details.");
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn test_retry_budget_follows_config_override() {
        let cfg = CascadeConfig {
            max_retries: 2,
            ..Default::default()
        };
        let fake = format!("Read {FAKE_LINK} first.");
        let mut scripted = ScriptedProvider::new().script(&cfg.router_model, escalate());
        for _ in 0..5 {
            scripted = scripted.script(&cfg.heavy_model, Script::Text(fake.clone()));
        }
        let orch = orchestrator(scripted.clone(), FixedArticles::default(), cfg.clone());

        let (events, result) = run_collect(&orch, request("How do I export?")).await;

        assert_eq!(scripted.requests_for(&cfg.heavy_model).len(), 3);
        assert_eq!(result.validation.heavy_attempts, 3);
        let retries = events
            .iter()
            .filter(|e| matches!(e, CascadeEvent::Retry { .. }))
            .count();
        assert_eq!(retries, 2);
        assert_eq!(result.answer, "Read first.");
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_permissive() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(
                &cfg.heavy_model,
                Script::Text(format!("See [Export guide]({FAKE_LINK}).")),
            );
        let orch = orchestrator(scripted.clone(), FixedArticles::failing(), cfg.clone());

        let (events, result) = run_collect(&orch, request("How do I export?")).await;

        assert_eq!(result.validation.heavy_attempts, 1);
        assert!(result.answer.contains(FAKE_LINK));
        assert!(!events.iter().any(|e| matches!(e, CascadeEvent::Retry { .. })));
    }

    #[tokio::test]
    async fn test_malformed_router_output_escalates_with_generic_reply() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, Script::Text("certainly! {handoff".to_string()))
            .script(&cfg.heavy_model, Script::Text("Here is how.".to_string()));
        let orch = orchestrator(scripted, FixedArticles::default(), cfg);

        let (events, result) = run_collect(&orch, request("Help?")).await;

        assert_eq!(result.source, CascadeSource::Heavy);
        assert!(result.router.is_none());
        let acks = acknowledgements(&events);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].text, GENERIC_QUICK_REPLY);
        assert!(!acks[0].from_router);
    }

    #[tokio::test]
    async fn test_router_transport_failure_escalates() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, Script::Fail("timeout".to_string()))
            .script(&cfg.heavy_model, Script::Text("Here is how.".to_string()));
        let orch = orchestrator(scripted, FixedArticles::default(), cfg);

        let (_, result) = run_collect(&orch, request("Help?")).await;

        assert_eq!(result.source, CascadeSource::Heavy);
        assert_eq!(result.answer, "Here is how.");
    }

    #[tokio::test]
    async fn test_heavy_failure_returns_apology() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(&cfg.heavy_model, Script::Fail("upstream 500".to_string()));
        let orch = orchestrator(scripted, FixedArticles::default(), cfg);

        let (events, result) = run_collect(&orch, request("How do I export?")).await;

        assert_eq!(result.source, CascadeSource::Heavy);
        assert_eq!(result.answer, APOLOGY_MESSAGE);
        assert!(result.degraded);
        assert!(result.buttons.is_empty());
        assert_final_last(&events, &result);
    }

    #[tokio::test]
    async fn test_heavy_failure_on_retry_keeps_stripped_answer() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(
                &cfg.heavy_model,
                Script::Text(format!("See [Export guide]({FAKE_LINK}) for details.")),
            )
            .script(&cfg.heavy_model, Script::Fail("upstream 500".to_string()));
        let orch = orchestrator(scripted, FixedArticles::with(&[123]), cfg);

        let (_, result) = run_collect(&orch, request("How do I export?")).await;

        assert!(!result.degraded);
        assert_eq!(result.answer, "See Export guide for details.");
        assert_eq!(result.validation.heavy_attempts, 2);
        assert_eq!(result.validation.stripped_references, vec![FAKE_LINK.to_string()]);
    }

    #[tokio::test]
    async fn test_buttons_extracted_and_withheld_from_deltas() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(
                &cfg.heavy_model,
                Script::Text(
                    r#"Try resetting your password. <buttons><button label="Reset password" value="reset" /></buttons>"#
                        .to_string(),
                ),
            );
        let orch = orchestrator(scripted, FixedArticles::default(), cfg);

        let (events, result) = run_collect(&orch, request("I can't log in")).await;

        assert_eq!(result.answer, "Try resetting your password.");
        assert_eq!(result.buttons.len(), 1);
        assert_eq!(result.buttons[0].value, "reset");
        assert!(!deltas(&events).contains("<button"));
    }

    #[tokio::test]
    async fn test_non_streaming_mode_emits_no_deltas() {
        let cfg = CascadeConfig {
            heavy_streaming_enabled: false,
            ..Default::default()
        };
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(&cfg.heavy_model, Script::Text("Complete answer.".to_string()));
        let orch = orchestrator(scripted.clone(), FixedArticles::default(), cfg.clone());

        let (events, result) = run_collect(&orch, request("How do I export?")).await;

        assert_eq!(result.answer, "Complete answer.");
        assert!(!events.iter().any(|e| matches!(e, CascadeEvent::Delta { .. })));
        assert!(!scripted.requests_for(&cfg.heavy_model)[0].stream);
    }

    #[tokio::test]
    async fn test_dropped_sink_still_returns_result() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(&cfg.heavy_model, Script::Text("Still answered.".to_string()));
        let orch = orchestrator(scripted, FixedArticles::default(), cfg);

        let (sink, rx) = EventSink::channel();
        drop(rx);
        let result = orch.run(request("Anyone there?"), sink.clone()).await;

        assert_eq!(result.answer, "Still answered.");
        assert!(sink.is_closed());
        assert!(!sink.emit(CascadeEvent::Progress {
            stage: ProgressStage::Complete
        }));
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, router_reply(false, 0.9, "Yes."));
        let orch = orchestrator(scripted, FixedArticles::default(), cfg);

        let result = orch.run(request("Is it on?"), EventSink::noop()).await;
        assert_eq!(result.answer, "Yes.");
    }

    #[tokio::test]
    async fn test_event_stream_ends_with_single_final() {
        let cfg = CascadeConfig::default();
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, escalate())
            .script(
                &cfg.heavy_model,
                Script::Delayed(
                    std::time::Duration::from_millis(20),
                    "Streamed answer here.".to_string(),
                ),
            );
        let orch = orchestrator(scripted, FixedArticles::default(), cfg);

        let events: Vec<CascadeEvent> = orch.stream(request("Stream it")).collect().await;

        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);
        assert!(events.last().unwrap().is_final());
        let stages: Vec<ProgressStage> = events
            .iter()
            .filter_map(|e| match e {
                CascadeEvent::Progress { stage } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                ProgressStage::Initial,
                ProgressStage::Analyzing,
                ProgressStage::RouterProcessing,
                ProgressStage::RouterDecided,
                ProgressStage::HeavyPending,
                ProgressStage::HeavyGenerating,
                ProgressStage::Complete,
            ]
        );
        assert_eq!(deltas(&events).trim(), "Streamed answer here.");
    }

    #[tokio::test]
    async fn test_history_is_trimmed_before_router() {
        let cfg = CascadeConfig {
            history_max_turns: 2,
            ..Default::default()
        };
        let scripted = ScriptedProvider::new()
            .script(&cfg.router_model, router_reply(false, 0.9, "Sure."));
        let orch = orchestrator(scripted.clone(), FixedArticles::default(), cfg.clone());

        let history = (0..6)
            .map(|i| ConversationTurn::user(format!("turn {i}")))
            .collect();
        let request = CascadeRequest {
            question: "And now?".to_string(),
            history,
            ..Default::default()
        };
        orch.run(request, EventSink::noop()).await;

        let sent = &scripted.requests_for(&cfg.router_model)[0].messages;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].content, "turn 4");
        assert_eq!(sent[2].content, "And now?");
    }
}
