//! HTTP API layer: routing, handlers, and the response envelope.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
