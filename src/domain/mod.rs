//! Domain layer - Core dispatch model
//!
//! This layer contains:
//! - Entities: Core business objects (User, Message, Command)
//! - Traits: Abstractions for infrastructure (Gateway, AuditSink)

pub mod entities;
pub mod traits;
