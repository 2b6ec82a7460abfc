//! HTTP request handlers.

pub mod cascade;
pub mod thread;
