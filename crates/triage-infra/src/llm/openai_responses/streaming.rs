//! SSE stream creation for the OpenAI Responses API.
//!
//! The Responses API streams typed events (`event:` name plus a JSON body
//! carrying the same `type`):
//! 1. `response.created` / `response.in_progress`
//! 2. `response.output_item.added` / `.done` -- tool calls and messages
//! 3. `response.output_text.delta` -- answer text
//! 4. `response.reasoning_summary_text.delta` -- reasoning summary
//! 5. `response.completed` / `response.incomplete` / `response.failed`
//! 6. `error` may appear mid-stream
//!
//! Each is mapped to the provider-agnostic [`StreamEvent`]. The stream ends
//! after the terminal event or the first error.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use secrecy::{ExposeSecret, SecretString};

use triage_core::llm::LlmStream;
use triage_types::llm::{LlmError, StreamEvent};

use super::client::{retry_after_ms, status_error};
use super::types::{ResponsesRequest, ResponsesStreamEvent};

/// Create a streaming SSE connection to the Responses API.
pub fn create_responses_stream(
    client: &reqwest::Client,
    url: &str,
    body: ResponsesRequest,
    api_key: &SecretString,
) -> LlmStream {
    let builder = client
        .post(url)
        .bearer_auth(api_key.expose_secret())
        .json(&body);

    let mut source = match builder.eventsource() {
        Ok(source) => source,
        Err(e) => {
            let err = LlmError::Stream(format!("cannot open event stream: {e}"));
            return Box::pin(futures_util::stream::once(async move { Err(err) }));
        }
    };
    source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

    Box::pin(async_stream::stream! {
        let mut finished = false;

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => yield Ok(StreamEvent::Connected),
                Ok(Event::Message(message)) => {
                    let parsed: ResponsesStreamEvent = match serde_json::from_str(&message.data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            yield Err(LlmError::Deserialization(format!(
                                "unparseable stream event '{}': {e}",
                                message.event
                            )));
                            break;
                        }
                    };

                    for mapped in map_stream_event(parsed) {
                        let terminal = matches!(mapped, Ok(StreamEvent::Done) | Err(_));
                        yield mapped;
                        if terminal {
                            finished = true;
                        }
                    }
                    if finished {
                        break;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let retry_after = retry_after_ms(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    yield Err(status_error(status.as_u16(), retry_after, body));
                    finished = true;
                    break;
                }
                Err(e) => {
                    yield Err(LlmError::Stream(e.to_string()));
                    finished = true;
                    break;
                }
            }
        }

        source.close();
        if !finished {
            yield Err(LlmError::Stream(
                "stream closed before the response completed".to_string(),
            ));
        }
    })
}

/// Map one Responses API event to zero or more [`StreamEvent`]s.
pub fn map_stream_event(event: ResponsesStreamEvent) -> Vec<Result<StreamEvent, LlmError>> {
    match event {
        ResponsesStreamEvent::Created | ResponsesStreamEvent::Other => Vec::new(),
        ResponsesStreamEvent::OutputTextDelta { delta } if delta.is_empty() => Vec::new(),
        ResponsesStreamEvent::OutputTextDelta { delta } => {
            vec![Ok(StreamEvent::TextDelta { text: delta })]
        }
        ResponsesStreamEvent::ReasoningSummaryDelta { delta } => {
            vec![Ok(StreamEvent::ReasoningDelta { text: delta })]
        }
        ResponsesStreamEvent::OutputItemAdded { item } => item
            .tool_call()
            .map(|(id, name, _)| {
                Ok(StreamEvent::ToolCallStarted {
                    id,
                    name: name.to_string(),
                })
            })
            .into_iter()
            .collect(),
        ResponsesStreamEvent::OutputItemDone { item } => item
            .tool_call()
            .map(|(id, name, detail)| {
                Ok(StreamEvent::ToolCallCompleted {
                    id,
                    name: name.to_string(),
                    detail,
                })
            })
            .into_iter()
            .collect(),
        ResponsesStreamEvent::Completed { response } | ResponsesStreamEvent::Incomplete { response } => {
            vec![
                Ok(StreamEvent::MessageDelta {
                    stop_reason: response.stop_reason(),
                }),
                Ok(StreamEvent::Usage(response.usage())),
                Ok(StreamEvent::Done),
            ]
        }
        ResponsesStreamEvent::Failed { response } => {
            let message = response
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "response failed".to_string());
            vec![Err(LlmError::Provider { message })]
        }
        ResponsesStreamEvent::Error { code, message } => {
            let err = match code.as_deref() {
                Some("rate_limit_exceeded") => LlmError::RateLimited {
                    retry_after_ms: None,
                },
                Some("server_is_overloaded") => LlmError::Overloaded(message),
                _ => LlmError::Provider { message },
            };
            vec![Err(err)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_types::llm::StopReason;

    fn parse(json: serde_json::Value) -> ResponsesStreamEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_text_delta_maps() {
        let mapped = map_stream_event(parse(serde_json::json!({
            "type": "response.output_text.delta", "delta": "Hello"
        })));
        assert!(matches!(
            mapped.as_slice(),
            [Ok(StreamEvent::TextDelta { text })] if text == "Hello"
        ));
    }

    #[test]
    fn test_empty_delta_skipped() {
        let mapped = map_stream_event(parse(serde_json::json!({
            "type": "response.output_text.delta", "delta": ""
        })));
        assert!(mapped.is_empty());
    }

    #[test]
    fn test_tool_call_lifecycle() {
        let started = map_stream_event(parse(serde_json::json!({
            "type": "response.output_item.added",
            "item": {"type": "file_search_call", "id": "fs_1", "status": "in_progress"}
        })));
        assert!(matches!(
            started.as_slice(),
            [Ok(StreamEvent::ToolCallStarted { id, name })] if id == "fs_1" && name == "file_search"
        ));

        let done = map_stream_event(parse(serde_json::json!({
            "type": "response.output_item.done",
            "item": {"type": "web_search_call", "id": "ws_1", "action": {"type": "search", "query": "export csv"}}
        })));
        assert!(matches!(
            done.as_slice(),
            [Ok(StreamEvent::ToolCallCompleted { name, detail: Some(d), .. })]
                if name == "web_search" && d == "query: export csv"
        ));

        let message_item = map_stream_event(parse(serde_json::json!({
            "type": "response.output_item.added",
            "item": {"type": "message", "id": "msg_1", "role": "assistant", "content": []}
        })));
        assert!(message_item.is_empty());
    }

    #[test]
    fn test_completed_ends_stream() {
        let mapped = map_stream_event(parse(serde_json::json!({
            "type": "response.completed",
            "response": {
                "id": "resp_1", "model": "gpt-5", "status": "completed", "output": [],
                "usage": {"input_tokens": 5, "output_tokens": 2}
            }
        })));
        assert_eq!(mapped.len(), 3);
        assert!(matches!(
            mapped[0],
            Ok(StreamEvent::MessageDelta { stop_reason: StopReason::EndTurn })
        ));
        assert!(matches!(mapped[2], Ok(StreamEvent::Done)));
    }

    #[test]
    fn test_error_event_classified() {
        let mapped = map_stream_event(parse(serde_json::json!({
            "type": "error", "code": "rate_limit_exceeded", "message": "slow down"
        })));
        assert!(matches!(mapped.as_slice(), [Err(LlmError::RateLimited { .. })]));

        let failed = map_stream_event(parse(serde_json::json!({
            "type": "response.failed",
            "response": {"id": "r", "model": "gpt-5", "status": "failed",
                         "error": {"code": "server_error", "message": "internal"}}
        })));
        assert!(matches!(
            failed.as_slice(),
            [Err(LlmError::Provider { message })] if message == "internal"
        ));
    }

    #[tokio::test]
    async fn test_stream_against_local_sse_server() {
        use std::convert::Infallible;

        use axum::response::sse::{Event as SseEvent, Sse};
        use axum::{Router, routing::post};

        fn sse(kind: &str, data: serde_json::Value) -> Result<SseEvent, Infallible> {
            Ok(SseEvent::default().event(kind).data(data.to_string()))
        }

        let app = Router::new().route(
            "/v1/responses",
            post(|| async {
                let events = vec![
                    sse("response.created", serde_json::json!({"type": "response.created"})),
                    sse(
                        "response.output_text.delta",
                        serde_json::json!({"type": "response.output_text.delta", "delta": "Open "}),
                    ),
                    sse(
                        "response.output_text.delta",
                        serde_json::json!({"type": "response.output_text.delta", "delta": "Reports."}),
                    ),
                    sse(
                        "response.completed",
                        serde_json::json!({"type": "response.completed", "response": {
                            "id": "resp_1", "model": "gpt-5", "status": "completed", "output": [],
                            "usage": {"input_tokens": 4, "output_tokens": 2}
                        }}),
                    ),
                ];
                Sse::new(futures_util::stream::iter(events))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = reqwest::Client::new();
        let body = ResponsesRequest {
            model: "gpt-5".to_string(),
            instructions: None,
            input: Vec::new(),
            max_output_tokens: 10,
            reasoning: None,
            text: None,
            tools: Vec::new(),
            stream: true,
            store: false,
        };
        let events: Vec<_> = create_responses_stream(
            &client,
            &format!("http://{addr}/v1/responses"),
            body,
            &SecretString::from("test-key"),
        )
        .collect()
        .await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::TextDelta { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Open Reports.");
        assert!(matches!(events.first(), Some(Ok(StreamEvent::Connected))));
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Done))));
    }
}
