//! Scripted provider and authorities shared by the core's unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use triage_types::error::AuthorityError;
use triage_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, StreamEvent, Usage,
};

use crate::llm::{LlmProvider, LlmStream};
use crate::validator::{ArticleAuthority, ReferenceListing};

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Script {
    /// Full text; streamed word by word.
    Text(String),
    /// Exact stream events.
    Events(Vec<StreamEvent>),
    /// Transport failure.
    Fail(String),
    /// Text streamed after a delay.
    Delayed(Duration, String),
}

/// Provider that replays scripted replies per model name and records every request.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Script>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, model: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn requests_for(&self, model: &str) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.model == model)
            .cloned()
            .collect()
    }

    fn next_script(&self, request: &CompletionRequest) -> Script {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&request.model)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Script::Fail(format!("no script for {}", request.model)))
    }
}

fn response(model: &str, content: String) -> CompletionResponse {
    CompletionResponse {
        id: "resp-test".to_string(),
        content,
        model: model.to_string(),
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
    }
}

fn text_events(text: &str) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::Connected];
    for word in text.split_inclusive(' ') {
        events.push(StreamEvent::TextDelta {
            text: word.to_string(),
        });
    }
    events.push(StreamEvent::MessageDelta {
        stop_reason: StopReason::EndTurn,
    });
    events.push(StreamEvent::Done);
    events
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        let script = self.next_script(request);
        let model = request.model.clone();
        async move {
            match script {
                Script::Text(text) => Ok(response(&model, text)),
                Script::Delayed(delay, text) => {
                    tokio::time::sleep(delay).await;
                    Ok(response(&model, text))
                }
                Script::Events(events) => {
                    let text: String = events
                        .iter()
                        .filter_map(|e| match e {
                            StreamEvent::TextDelta { text } => Some(text.as_str()),
                            _ => None,
                        })
                        .collect();
                    Ok(response(&model, text))
                }
                Script::Fail(message) => Err(LlmError::Provider { message }),
            }
        }
    }

    fn stream(&self, request: CompletionRequest) -> LlmStream {
        let script = self.next_script(&request);
        Box::pin(async_stream::stream! {
            let (delay, events) = match script {
                Script::Text(text) => (None, text_events(&text)),
                Script::Delayed(delay, text) => (Some(delay), text_events(&text)),
                Script::Events(events) => (None, events),
                Script::Fail(message) => {
                    yield Err(LlmError::Provider { message });
                    return;
                }
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            for event in events {
                yield Ok(event);
            }
        })
    }
}

/// Article authority backed by a fixed set of published ids.
#[derive(Clone, Default)]
pub struct FixedArticles {
    pub published: HashSet<u64>,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl FixedArticles {
    pub fn with(ids: &[u64]) -> Self {
        Self {
            published: ids.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArticleAuthority for FixedArticles {
    fn exists(&self, article_id: u64) -> impl Future<Output = Result<bool, AuthorityError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail {
            Err(AuthorityError::Request("connection refused".to_string()))
        } else {
            Ok(self.published.contains(&article_id))
        };
        async move { result }
    }
}

/// Listing authority backed by a fixed URL set, optionally failing after N fetches.
#[derive(Clone, Default)]
pub struct FixedListing {
    pub urls: HashSet<String>,
    pub fail_after: Option<usize>,
    pub calls: Arc<AtomicUsize>,
}

impl FixedListing {
    pub fn with(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReferenceListing for FixedListing {
    fn list_known_references(
        &self,
    ) -> impl Future<Output = Result<HashSet<String>, AuthorityError>> + Send {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.fail_after {
            Some(limit) if n >= limit => Err(AuthorityError::UnexpectedStatus {
                status: 503,
                message: "unavailable".to_string(),
            }),
            _ => Ok(self.urls.clone()),
        };
        async move { result }
    }
}
