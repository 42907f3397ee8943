//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Audit: Per-event log sinks
//! - Adapters: Transport integrations (console, Telegram, in-memory)

pub mod adapters;
pub mod audit;
pub mod config;
