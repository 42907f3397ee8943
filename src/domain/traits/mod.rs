//! Domain traits - Abstractions for infrastructure implementations

pub mod audit;
pub mod gateway;

pub use audit::{AuditLogFactory, AuditSink};
pub use gateway::{Connector, EventHandler, Gateway};
