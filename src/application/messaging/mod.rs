//! Message handling - Tokenizing, per-event context and dispatch

pub mod audit_log;
pub mod bundle;
pub mod cancelation;
pub mod dispatcher;
pub mod parser;

pub use audit_log::AuditLog;
pub use bundle::Bundle;
pub use cancelation::{cancelation, ignore_bots, Cancelation, RateLimiter};
pub use dispatcher::{Dispatch, Dispatcher, Report};
pub use parser::tokenize;
