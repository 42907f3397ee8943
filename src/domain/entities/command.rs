use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::errors::OperationError;
use crate::application::messaging::Bundle;

/// Handler's own assessment of how a run went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Warning,
    Fatal,
    /// Asks the bot to shut down once the result is reported
    Exit,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Warning => "WARNING",
            Outcome::Fatal => "FATAL",
            Outcome::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a command hands back to the dispatcher: an outcome plus an optional cause
#[derive(Debug)]
pub struct CommandOutput {
    pub outcome: Outcome,
    pub error: Option<OperationError>,
}

impl CommandOutput {
    pub fn new(outcome: Outcome) -> Self {
        Self { outcome, error: None }
    }

    pub fn success() -> Self {
        Self::new(Outcome::Success)
    }

    pub fn warning() -> Self {
        Self::new(Outcome::Warning)
    }

    pub fn fatal() -> Self {
        Self::new(Outcome::Fatal)
    }

    pub fn exit() -> Self {
        Self::new(Outcome::Exit)
    }

    /// Fatal outcome carrying the failed operation and its cause
    pub fn failed(
        operation: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::fatal().with_error(OperationError::new(operation, cause))
    }

    pub fn with_error(mut self, error: OperationError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<Outcome> for CommandOutput {
    fn from(outcome: Outcome) -> Self {
        Self::new(outcome)
    }
}

impl From<Result<Outcome, OperationError>> for CommandOutput {
    fn from(result: Result<Outcome, OperationError>) -> Self {
        match result {
            Ok(outcome) => Self::new(outcome),
            Err(e) => Self::fatal().with_error(e),
        }
    }
}

/// A registered handler.
///
/// Receives the per-event bundle and the full tokenized line. Implement this
/// directly for handlers that need to await (sending replies and so on), or
/// wrap a plain closure with [`command_fn`].
#[async_trait]
pub trait Command: Send + Sync {
    async fn run(&self, bundle: &Bundle<'_>, args: &[String]) -> CommandOutput;
}

/// Adapter turning a synchronous closure into a [`Command`]
pub struct FnCommand<F> {
    f: F,
}

#[async_trait]
impl<F> Command for FnCommand<F>
where
    F: Fn(&Bundle<'_>, &[String]) -> CommandOutput + Send + Sync,
{
    async fn run(&self, bundle: &Bundle<'_>, args: &[String]) -> CommandOutput {
        (self.f)(bundle, args)
    }
}

pub fn command_fn<F>(f: F) -> FnCommand<F>
where
    F: Fn(&Bundle<'_>, &[String]) -> CommandOutput + Send + Sync + 'static,
{
    FnCommand { f }
}

/// Which pass of the dispatcher a command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Exact match on the first token
    Prefix,
    /// First token anywhere in the line that matches
    Inline,
    /// Runs on every event that was not cancelled
    Custom,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Prefix => "prefix",
            CommandKind::Inline => "inline",
            CommandKind::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub kind: CommandKind,
    pub name: String,
}

impl CommandKey {
    pub fn new(kind: CommandKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

struct Entry {
    command: Arc<dyn Command>,
    slot: usize,
}

/// Command registry keyed by kind and name.
///
/// Written during setup only; dispatch reads it concurrently without locking.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<CommandKey, Entry>,
    next_slot: usize,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns `true` when an existing entry was replaced;
    /// a replaced entry keeps its original position.
    pub fn register(&mut self, kind: CommandKind, name: impl Into<String>, command: Arc<dyn Command>) -> bool {
        let key = CommandKey::new(kind, name);
        if let Some(entry) = self.commands.get_mut(&key) {
            entry.command = command;
            return true;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.commands.insert(key, Entry { command, slot });
        false
    }

    pub fn get(&self, kind: CommandKind, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands
            .get(&CommandKey::new(kind, name))
            .map(|e| &e.command)
    }

    /// Handler for an exact match on the first token
    pub fn prefix(&self, args: &[String]) -> Option<&Arc<dyn Command>> {
        args.first().and_then(|first| self.get(CommandKind::Prefix, first))
    }

    /// Leftmost token with an inline handler, with its index
    pub fn first_inline(&self, args: &[String]) -> Option<(usize, &Arc<dyn Command>)> {
        args.iter()
            .enumerate()
            .find_map(|(i, arg)| self.get(CommandKind::Inline, arg).map(|cmd| (i, cmd)))
    }

    /// Custom handlers in registration order
    pub fn customs(&self) -> Vec<(&str, &Arc<dyn Command>)> {
        let mut customs: Vec<_> = self
            .commands
            .iter()
            .filter(|(key, _)| key.kind == CommandKind::Custom)
            .map(|(key, entry)| (entry.slot, key.name.as_str(), &entry.command))
            .collect();
        customs.sort_by_key(|(slot, _, _)| *slot);
        customs.into_iter().map(|(_, name, cmd)| (name, cmd)).collect()
    }

    /// Registered names of one kind, in registration order
    pub fn names(&self, kind: CommandKind) -> Vec<&str> {
        let mut names: Vec<_> = self
            .commands
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(key, entry)| (entry.slot, key.name.as_str()))
            .collect();
        names.sort_by_key(|(slot, _)| *slot);
        names.into_iter().map(|(_, name)| name).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
