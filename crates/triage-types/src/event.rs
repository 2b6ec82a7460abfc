//! Outbound event protocol for a cascade invocation.
//!
//! `CascadeEvent` is what clients render as live status. Every invocation
//! emits zero or more advisory events followed by exactly one `Final`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cascade::{CascadeResult, QuickReply, RouterDecision};

/// Advisory progress stage. Clients may show these as a status line; they
/// carry no semantics beyond ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Initial,
    Analyzing,
    RouterProcessing,
    RouterDecided,
    HeavyPending,
    HeavySearching,
    HeavyGenerating,
    Complete,
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressStage::Initial => "initial",
            ProgressStage::Analyzing => "analyzing",
            ProgressStage::RouterProcessing => "router_processing",
            ProgressStage::RouterDecided => "router_decided",
            ProgressStage::HeavyPending => "heavy_pending",
            ProgressStage::HeavySearching => "heavy_searching",
            ProgressStage::HeavyGenerating => "heavy_generating",
            ProgressStage::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Status of a hosted tool call surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    Completed,
}

/// Events emitted to the client during one cascade invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CascadeEvent {
    /// Advisory progress update.
    Progress { stage: ProgressStage },

    /// Escalation decided; shown immediately while the heavy stage runs.
    Acknowledgement {
        quick_reply: QuickReply,
        #[serde(skip_serializing_if = "Option::is_none")]
        decision: Option<RouterDecision>,
    },

    /// Incremental heavy-answer text.
    Delta { text: String },

    /// Invalid references were found and the heavy stage is being re-run.
    /// Clients should discard text streamed so far.
    Retry {
        attempt: u32,
        invalid_references: Vec<String>,
    },

    /// Secondary workflow step notification (e.g. reasoning summaries).
    Workflow { step: String },

    /// A hosted tool invocation.
    Tool {
        name: String,
        status: ToolStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// Terminal event. Always the last one for an invocation.
    Final { result: CascadeResult },
}

impl CascadeEvent {
    /// SSE event name for this variant.
    pub fn event_name(&self) -> &'static str {
        match self {
            CascadeEvent::Progress { .. } => "progress",
            CascadeEvent::Acknowledgement { .. } => "acknowledgement",
            CascadeEvent::Delta { .. } => "delta",
            CascadeEvent::Retry { .. } => "retry",
            CascadeEvent::Workflow { .. } => "workflow",
            CascadeEvent::Tool { .. } => "tool",
            CascadeEvent::Final { .. } => "final",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, CascadeEvent::Final { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_serde() {
        let event = CascadeEvent::Progress {
            stage: ProgressStage::RouterDecided,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "router_decided");
        assert_eq!(event.event_name(), "progress");
    }

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [
            ProgressStage::Initial,
            ProgressStage::HeavySearching,
            ProgressStage::Complete,
        ] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{stage}\""));
        }
    }

    #[test]
    fn test_acknowledgement_skips_missing_decision() {
        let event = CascadeEvent::Acknowledgement {
            quick_reply: QuickReply {
                text: "One moment".to_string(),
                from_router: false,
            },
            decision: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "acknowledgement");
        assert!(json.get("decision").is_none());
        assert_eq!(json["quick_reply"]["text"], "One moment");
    }

    #[test]
    fn test_retry_roundtrip() {
        let event = CascadeEvent::Retry {
            attempt: 2,
            invalid_references: vec!["https://help.example.com/x".to_string()],
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: CascadeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert!(!parsed.is_final());
    }
}
