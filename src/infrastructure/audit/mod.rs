//! Per-event audit log sinks

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Local;

use crate::application::errors::AuditError;
use crate::domain::traits::{AuditLogFactory, AuditSink};

/// Writes each event's trace to `<base_path>/<event id>.log`
pub struct FileAuditLogFactory {
    base_path: PathBuf,
}

impl FileAuditLogFactory {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Path of the file an event id maps to
    pub fn path_for(&self, event_id: &str) -> PathBuf {
        let name: String = event_id
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.base_path.join(format!("{}.log", name))
    }
}

impl AuditLogFactory for FileAuditLogFactory {
    fn create(&self, event_id: &str) -> Result<Box<dyn AuditSink>, AuditError> {
        std::fs::create_dir_all(&self.base_path)?;
        let path = self.path_for(event_id);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::trace!("Opened audit log {}", path.display());
        Ok(Box::new(FileSink {
            file: Mutex::new(file),
        }))
    }
}

struct FileSink {
    file: Mutex<File>,
}

impl AuditSink for FileSink {
    fn write_line(&self, line: &str) -> Result<(), AuditError> {
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(file, "{} {}", Local::now().format("%Y/%m/%d %H:%M:%S"), line)?;
        Ok(())
    }
}

/// A line recorded by [`MemoryAuditLogFactory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub event_id: String,
    pub line: String,
}

/// Keeps audit lines in memory, for tests and console sessions without a log directory
#[derive(Clone, Default)]
pub struct MemoryAuditLogFactory {
    events: Arc<Mutex<Vec<String>>>,
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditLogFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event ids a sink was created for, in order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.line).collect()
    }
}

impl AuditLogFactory for MemoryAuditLogFactory {
    fn create(&self, event_id: &str) -> Result<Box<dyn AuditSink>, AuditError> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event_id.to_string());
        Ok(Box::new(MemorySink {
            event_id: event_id.to_string(),
            entries: Arc::clone(&self.entries),
        }))
    }
}

struct MemorySink {
    event_id: String,
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl AuditSink for MemorySink {
    fn write_line(&self, line: &str) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(AuditEntry {
                event_id: self.event_id.clone(),
                line: line.to_string(),
            });
        Ok(())
    }
}
