use thiserror::Error;

use crate::llm::LlmError;

/// Failures inside a cascade invocation.
///
/// None of these escape the orchestrator: each one resolves to escalation,
/// a permissive validation pass, or the apology fallback.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("malformed router decision: {0}")]
    MalformedDecision(String),

    #[error("agent call failed: {0}")]
    Agent(#[from] LlmError),

    #[error("reference authority unavailable: {0}")]
    AuthorityUnavailable(String),
}

/// Errors from a reference authority (help center, sitemap).
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority not configured")]
    NotConfigured,

    #[error("authority request failed: {0}")]
    Request(String),

    #[error("unexpected authority response ({status}): {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("could not parse authority response: {0}")]
    Parse(String),
}

impl From<AuthorityError> for CascadeError {
    fn from(err: AuthorityError) -> Self {
        CascadeError::AuthorityUnavailable(err.to_string())
    }
}

/// Errors from conversation store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_error_from_llm_error() {
        let err: CascadeError = LlmError::AuthenticationFailed.into();
        assert!(matches!(err, CascadeError::Agent(_)));
        assert_eq!(err.to_string(), "agent call failed: authentication failed");
    }

    #[test]
    fn test_authority_error_maps_to_unavailable() {
        let err: CascadeError = AuthorityError::UnexpectedStatus {
            status: 503,
            message: "maintenance".to_string(),
        }
        .into();
        assert!(matches!(err, CascadeError::AuthorityUnavailable(_)));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("bad thread id".to_string());
        assert_eq!(err.to_string(), "query error: bad thread id");
    }
}
