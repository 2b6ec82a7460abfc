//! Cascade request/result types.
//!
//! One cascade invocation takes a [`CascadeRequest`] and produces exactly one
//! [`CascadeResult`]. Everything else in this module (router decision, quick
//! reply, buttons, timings) lives only for the duration of that invocation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chat::ConversationTurn;

/// Structured triage decision produced by the router model.
///
/// This is also the structured-output schema the router model is
/// constrained to, so field docs double as model guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouterDecision {
    /// True when the question needs the deeper, tool-assisted agent.
    pub handoff: bool,
    /// The direct answer, or a short acknowledgement when handing off.
    pub answer: String,
    /// Brief justification for the decision.
    #[serde(default)]
    pub reason: Option<String>,
    /// Confidence in `answer` between 0 and 1.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Whether the customer will likely need to follow up.
    #[serde(default)]
    pub follow_up_needed: Option<bool>,
}

impl RouterDecision {
    /// Whether the router's own answer may be served directly.
    ///
    /// A missing confidence counts as zero.
    pub fn is_trusted(&self, threshold: f64) -> bool {
        !self.handoff && self.confidence.unwrap_or(0.0) >= threshold
    }
}

/// Ephemeral acknowledgement shown while the heavy stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReply {
    pub text: String,
    /// True when the wording came from the router rather than the generic fallback.
    pub from_router: bool,
}

/// Which stage produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeSource {
    Router,
    Heavy,
}

impl fmt::Display for CascadeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeSource::Router => write!(f, "router"),
            CascadeSource::Heavy => write!(f, "heavy"),
        }
    }
}

/// A suggested quick-action button attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSuggestion {
    pub label: String,
    pub value: String,
}

/// Wall-clock timings for one invocation, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeTimings {
    pub router_ms: u64,
    /// Summed across all heavy attempts; `None` when the heavy stage never ran.
    pub heavy_ms: Option<u64>,
    pub total_ms: u64,
}

/// How reference validation went for the final answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Number of heavy-stage invocations (0 when the router answered).
    pub heavy_attempts: u32,
    /// URLs that were still invalid at the end and got stripped to anchor text.
    pub stripped_references: Vec<String>,
    /// True when retries ran out with invalid references remaining.
    pub retry_budget_exhausted: bool,
}

/// The single authoritative output of one cascade invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub source: CascadeSource,
    pub answer: String,
    pub buttons: Vec<ButtonSuggestion>,
    pub timings: CascadeTimings,
    /// The router decision, when one was successfully parsed.
    pub router: Option<RouterDecision>,
    pub validation: ValidationSummary,
    /// True when `answer` is the apology fallback after an unrecoverable failure.
    pub degraded: bool,
}

/// Contextual metadata about the customer asking the question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeContext {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    /// The page the customer was on when asking.
    #[serde(default)]
    pub origin_url: Option<String>,
}

/// Text description of an image the customer attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(default)]
    pub file_name: Option<String>,
    pub description: String,
}

/// Input to one cascade invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub context: CascadeContext,
    #[serde(default)]
    pub attachments: Vec<ImageAttachment>,
}
