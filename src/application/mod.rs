//! Application layer - Bot lifecycle and the dispatch pipeline
//!
//! This layer contains:
//! - Bot: registration, identity, liveness, run/stop
//! - Messaging: tokenizing, bundles, cancelations, dispatching
//! - Services: result reporting
//! - Errors: Application errors

pub mod bot;
pub mod errors;
pub mod messaging;
pub mod services;
