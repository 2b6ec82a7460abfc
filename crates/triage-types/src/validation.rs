//! Reference validation outcome types.

use serde::{Deserialize, Serialize};

/// A link in a candidate answer that no authority could confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidReference {
    pub url: String,
    /// Anchor text for markdown links; `None` for bare URLs.
    pub anchor_text: Option<String>,
}

/// Result of validating every reference in one candidate answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub invalid_references: Vec<InvalidReference>,
    /// Number of distinct support-domain URLs that were checked.
    pub checked: usize,
}

impl ValidationOutcome {
    pub fn has_invalid(&self) -> bool {
        !self.invalid_references.is_empty()
    }

    /// Invalid URLs in first-seen order.
    pub fn invalid_urls(&self) -> Vec<String> {
        self.invalid_references.iter().map(|r| r.url.clone()).collect()
    }
}

/// Verdict on a single URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceVerdict {
    /// An authority confirmed the reference exists.
    Valid,
    /// An authority confirmed the reference does not exist.
    Invalid,
    /// No authority could answer; treated as valid and never cached.
    Unknown,
}

impl ReferenceVerdict {
    pub fn is_acceptable(self) -> bool {
        !matches!(self, ReferenceVerdict::Invalid)
    }

    /// Whether the verdict came from an authority and may be cached.
    pub fn is_definite(self) -> bool {
        !matches!(self, ReferenceVerdict::Unknown)
    }
}
