use crate::application::errors::AuditError;

/// Append-only sink holding one event's dispatch trace
pub trait AuditSink: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), AuditError>;
}

/// Allocates a dedicated sink per event
pub trait AuditLogFactory: Send + Sync {
    /// `event_id` is unique per event (timestamp plus message id)
    fn create(&self, event_id: &str) -> Result<Box<dyn AuditSink>, AuditError>;
}
