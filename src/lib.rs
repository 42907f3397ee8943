//! Command dispatch core for a chat bot
//!
//! Inbound messages are tokenized and routed through cancelation predicates,
//! always-run custom commands, the first matching inline command and an
//! exact-match prefix command. Every event gets its own audit log.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bot::{Bot, Liveness};
pub use application::errors::{BotError, OperationError};
pub use application::messaging::{Bundle, Dispatch};
pub use domain::entities::{command_fn, Command, CommandKind, CommandOutput, Message, Outcome, User};
