//! OpenAI Responses API provider implementation.
//!
//! This module provides the [`OpenAiResponsesProvider`] which implements the
//! [`LlmProvider`](triage_core::llm::LlmProvider) trait for the `/responses`
//! endpoint, including hosted retrieval tools, structured output and SSE
//! streaming.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::OpenAiResponsesProvider;
