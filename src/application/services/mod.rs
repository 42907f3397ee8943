//! Application services - Result reporting

pub mod reporter;

pub use reporter::{report, Status, FAILURE_REPLY};
