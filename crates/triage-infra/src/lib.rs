//! Infrastructure layer for the triage service.
//!
//! Contains implementations of the ports defined in `triage-core`: the
//! OpenAI Responses API provider, help-center and sitemap reference
//! authorities, the in-memory conversation store, and the TOML config
//! loader.

pub mod authority;
pub mod config;
pub mod llm;
pub mod store;
