//! LLM provider abstractions for the cascade.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `StreamInSpan`: keeps a tracing span entered across stream polls

pub mod box_provider;
pub mod provider;
pub mod span_stream;

pub use box_provider::BoxLlmProvider;
pub use provider::{LlmProvider, LlmStream};
