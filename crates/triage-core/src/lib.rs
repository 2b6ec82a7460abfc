//! Cascade orchestration for the triage service.
//!
//! This crate holds the stage logic (router, heavy agent, reference
//! validation) and the ports the infrastructure layer implements
//! (`LlmProvider`, `ArticleAuthority`, `ReferenceListing`,
//! `ConversationStore`). It never depends on `triage-infra` or any HTTP
//! client.

pub mod buttons;
pub mod heavy;
pub mod history;
pub mod llm;
pub mod merge;
pub mod orchestrator;
pub mod prompt;
pub mod router;
pub mod state;
pub mod store;
pub mod validator;

#[cfg(test)]
mod testing;
