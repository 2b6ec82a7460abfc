//! Shared domain types for the triage cascade.
//!
//! This crate contains the data shapes exchanged between the cascade core,
//! the provider/authority adapters and the HTTP layer: conversation turns,
//! LLM requests and stream events, router decisions, cascade results,
//! outbound events, configuration and error types.
//!
//! Zero infrastructure dependencies -- only serde, schemars, thiserror.

pub mod cascade;
pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod validation;
