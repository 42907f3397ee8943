//! Message dispatcher - Routes one event through the command passes
//!
//! Order is fixed:
//!
//! 1. Cancelation predicates, in registration order; the first `true` drops the event
//! 2. Every custom command
//! 3. The first inline command, by leftmost matching token
//! 4. The prefix command matching the first token exactly
//!
//! Passes 2-4 are independent: a custom run does not stop inline or prefix
//! resolution, and a first token may fire both an inline and a prefix command.

use super::cancelation::Cancelation;
use super::parser::render_line;
use super::Bundle;
use crate::application::services::{report, Status};
use crate::domain::entities::{CommandKind, CommandRegistry};

/// How an event's dispatch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Authored by the bot itself; never logged
    Ignored,
    /// Dropped by a cancelation predicate
    Cancelled,
    /// Nothing left after tokenizing
    Empty,
    /// One report per command that ran
    Completed(Vec<Report>),
}

/// One command run and its reported status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub kind: CommandKind,
    pub label: String,
    pub status: Status,
}

impl Dispatch {
    pub fn reports(&self) -> &[Report] {
        match self {
            Dispatch::Completed(reports) => reports,
            _ => &[],
        }
    }
}

/// Borrowed view of a bot's commands and cancelations
pub struct Dispatcher<'a> {
    registry: &'a CommandRegistry,
    cancelations: &'a [Cancelation],
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a CommandRegistry, cancelations: &'a [Cancelation]) -> Self {
        Self {
            registry,
            cancelations,
        }
    }

    pub async fn dispatch(&self, mut bundle: Bundle<'_>, args: &[String]) -> Dispatch {
        if self.cancelled(&bundle) {
            let event_id = bundle.log().event_id().to_string();
            tracing::debug!("[CANCEL] message ID {}", event_id);
            bundle.log().log("CANCEL event dropped by cancelation");
            return Dispatch::Cancelled;
        }

        if args.is_empty() {
            bundle.log().log("START no cmd available");
            return Dispatch::Empty;
        }

        let mut reports = Vec::new();
        self.run_customs(&bundle, args, &mut reports).await;
        self.run_inline(&mut bundle, args, &mut reports).await;
        self.run_prefix(&mut bundle, args, &mut reports).await;
        Dispatch::Completed(reports)
    }

    fn cancelled(&self, bundle: &Bundle<'_>) -> bool {
        self.cancelations.iter().any(|cancel| cancel(bundle))
    }

    async fn run_customs(&self, bundle: &Bundle<'_>, args: &[String], reports: &mut Vec<Report>) {
        for (name, cmd) in self.registry.customs() {
            bundle
                .log()
                .log(&format!("START custom cmd:{} args {}", name, render_line(args)));
            let output = cmd.run(bundle, args).await;
            let status = report(bundle, name, args, output).await;
            reports.push(Report {
                kind: CommandKind::Custom,
                label: name.to_string(),
                status,
            });
        }
    }

    async fn run_inline(&self, bundle: &mut Bundle<'_>, args: &[String], reports: &mut Vec<Report>) {
        let Some((index, cmd)) = self.registry.first_inline(args) else {
            return;
        };
        bundle.set_cmd_index(index);
        let token = &args[index];

        bundle
            .log()
            .log(&format!("START inline cmd:{} line {}", token, render_line(args)));
        let output = cmd.run(bundle, args).await;
        let status = report(bundle, token, args, output).await;
        reports.push(Report {
            kind: CommandKind::Inline,
            label: token.clone(),
            status,
        });
    }

    async fn run_prefix(&self, bundle: &mut Bundle<'_>, args: &[String], reports: &mut Vec<Report>) {
        let Some(cmd) = self.registry.prefix(args) else {
            return;
        };
        bundle.set_cmd_index(0);
        let name = &args[0];

        bundle
            .log()
            .log(&format!("START cmd:{} args {}", name, render_line(&args[1..])));
        let output = cmd.run(bundle, args).await;
        let status = report(bundle, name, args, output).await;
        reports.push(Report {
            kind: CommandKind::Prefix,
            label: name.clone(),
            status,
        });
    }
}
