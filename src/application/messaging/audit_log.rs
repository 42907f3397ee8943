//! Per-event audit log handle

use crate::application::errors::AuditError;
use crate::domain::traits::AuditSink;

/// Sink used when a dedicated one could not be allocated; lines still reach tracing
struct DetachedSink;

impl AuditSink for DetachedSink {
    fn write_line(&self, _line: &str) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Logger scoped to a single event's dispatch.
///
/// Every line goes to the event's own sink and is mirrored to `tracing` at
/// debug level, tagged with the event id.
pub struct AuditLog {
    event_id: String,
    sink: Box<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(event_id: impl Into<String>, sink: Box<dyn AuditSink>) -> Self {
        Self {
            event_id: event_id.into(),
            sink,
        }
    }

    pub fn detached(event_id: impl Into<String>) -> Self {
        Self::new(event_id, Box::new(DetachedSink))
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn log(&self, line: &str) {
        tracing::debug!(event = %self.event_id, "{}", line);
        if let Err(e) = self.sink.write_line(line) {
            tracing::warn!(event = %self.event_id, "Failed to write audit line: {}", e);
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("event_id", &self.event_id)
            .finish()
    }
}
