//! Cascade endpoints.
//!
//! - POST /api/v1/cascade         - run one invocation, return the result
//! - POST /api/v1/cascade/stream  - run one invocation as Server-Sent Events
//!
//! SSE event types:
//! - `thread` -- initial event with `{ "thread_id": "..." }`
//! - one event per `CascadeEvent`, named by its variant (`progress`,
//!   `acknowledgement`, `delta`, `retry`, `workflow`, `tool`, `final`)
//!
//! Invocations run on their own task so a client disconnect never aborts
//! one halfway; the user and assistant turns are appended to the thread
//! once the result is known.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use triage_core::orchestrator::EventSink;
use triage_core::store::ConversationStore;
use triage_types::cascade::{CascadeContext, CascadeRequest, CascadeResult, ImageAttachment};
use triage_types::chat::ConversationTurn;
use triage_types::config::{CascadeConfig, CascadeConfigOverride};
use triage_types::event::CascadeEvent;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body shared by both cascade endpoints.
#[derive(Debug, Deserialize)]
pub struct CascadeBody {
    pub question: String,
    /// Thread to continue; a new one is started when absent.
    #[serde(default)]
    pub thread_id: Option<Uuid>,
    /// Explicit history. When empty, the stored thread history is used.
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub context: CascadeContext,
    #[serde(default)]
    pub attachments: Vec<ImageAttachment>,
    /// Per-request config overrides.
    #[serde(default)]
    pub config: Option<CascadeConfigOverride>,
}

#[derive(Debug, Serialize)]
pub struct CascadeResponse {
    pub thread_id: Uuid,
    pub result: CascadeResult,
}

struct Invocation {
    thread_id: Uuid,
    request: CascadeRequest,
    config: CascadeConfig,
}

async fn prepare(state: &AppState, body: CascadeBody) -> Result<Invocation, AppError> {
    if body.question.trim().is_empty() {
        return Err(AppError::Validation("question must not be empty".to_string()));
    }

    let thread_id = body.thread_id.unwrap_or_else(Uuid::now_v7);
    let history = if body.history.is_empty() {
        state.store.load_history(&thread_id).await?
    } else {
        body.history
    };

    let base = state.orchestrator.config();
    let config = match &body.config {
        Some(overrides) => base.with_overrides(overrides),
        None => base.clone(),
    };

    Ok(Invocation {
        thread_id,
        request: CascadeRequest {
            question: body.question,
            history,
            context: body.context,
            attachments: body.attachments,
        },
        config,
    })
}

/// Run one invocation on its own task, relaying its events to `sink`.
///
/// `Final` is held back until the turns are persisted, so a client that
/// reads the thread right after `final` sees the new turns.
fn spawn_invocation(state: AppState, invocation: Invocation, sink: EventSink) -> JoinHandle<CascadeResult> {
    let Invocation {
        thread_id,
        request,
        config,
    } = invocation;

    tokio::spawn(async move {
        let question = request.question.clone();
        let (relay, mut events) = EventSink::channel();
        let run = state.orchestrator.run_with_config(request, &config, relay);
        let mut run = std::pin::pin!(run);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => forward(&sink, event),
                result = &mut run => break result,
            }
        };
        while let Ok(event) = events.try_recv() {
            forward(&sink, event);
        }

        let turns = [
            ConversationTurn::user(question),
            ConversationTurn::assistant(result.answer.clone()),
        ];
        if let Err(e) = state.store.append_turns(&thread_id, &turns).await {
            tracing::warn!(%thread_id, error = %e, "Failed to persist cascade turns");
        }

        sink.emit(CascadeEvent::Final {
            result: result.clone(),
        });
        result
    })
}

fn forward(sink: &EventSink, event: CascadeEvent) {
    if !event.is_final() {
        sink.emit(event);
    }
}

/// POST /api/v1/cascade -- run one invocation and return its result.
pub async fn run_cascade(
    State(state): State<AppState>,
    Json(body): Json<CascadeBody>,
) -> Result<ApiResponse<CascadeResponse>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let invocation = prepare(&state, body).await?;
    let thread_id = invocation.thread_id;
    let result = spawn_invocation(state, invocation, EventSink::noop())
        .await
        .map_err(|e| AppError::Internal(format!("cascade task failed: {e}")))?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(
        ApiResponse::success(CascadeResponse { thread_id, result }, request_id, elapsed)
            .with_link("thread", &format!("/api/v1/threads/{thread_id}")),
    )
}

/// POST /api/v1/cascade/stream -- SSE stream of cascade events.
pub async fn stream_cascade(
    State(state): State<AppState>,
    Json(body): Json<CascadeBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let invocation = prepare(&state, body).await?;
    let thread_id = invocation.thread_id;

    let thread_event = Event::default()
        .event("thread")
        .json_data(serde_json::json!({ "thread_id": thread_id }))
        .map_err(|e| AppError::Internal(format!("failed to encode thread event: {e}")))?;

    let (sink, rx) = EventSink::channel();
    spawn_invocation(state, invocation, sink);

    let head = futures_util::stream::once(async move { Ok::<_, Infallible>(thread_event) });
    let events = UnboundedReceiverStream::new(rx).map(|event| Ok(to_sse(&event)));

    Ok(Sse::new(head.chain(events)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn to_sse(event: &CascadeEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, event = event.event_name(), "Failed to encode cascade event");
            Event::default().event("error").data(r#"{"message":"encoding failed"}"#)
        })
}
