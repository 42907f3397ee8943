//! Result reporting - logs each command run and escalates errors

use std::fmt;

use crate::application::messaging::parser::render_line;
use crate::application::messaging::Bundle;
use crate::domain::entities::{CommandOutput, Outcome};

/// Reply shown in the originating channel when a command fails
pub const FAILURE_REPLY: &str = "that didn't go as planned";

/// Status written to the FINISH line of a command run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Warning,
    Fatal,
    Exit,
    Error,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Warning => "WARNING",
            Status::Fatal => "FATAL",
            Status::Exit => "EXIT",
            Status::Error => "ERROR",
        }
    }
}

impl From<Outcome> for Status {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => Status::Success,
            Outcome::Warning => Status::Warning,
            Outcome::Fatal => Status::Fatal,
            Outcome::Exit => Status::Exit,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Interpret one command's output.
///
/// `Exit` clears the bot's liveness. Any error turns the status into `ERROR`
/// and is escalated to the owner by DM plus a short reply in the channel;
/// failing to deliver either is logged and does not stop the dispatch.
pub async fn report(bundle: &Bundle<'_>, label: &str, args: &[String], output: CommandOutput) -> Status {
    let mut status = Status::from(output.outcome);

    if let Some(err) = &output.error {
        status = Status::Error;
        escalate(bundle, label, &err.to_string()).await;
    }

    bundle.log().log(&format!(
        "FINISH cmd:{} line:{} result:{}",
        label,
        render_line(args),
        status
    ));

    // Cleared last so the trace is complete before the run loop wakes
    if output.outcome == Outcome::Exit {
        bundle.bot().liveness().clear();
    }
    status
}

async fn escalate(bundle: &Bundle<'_>, label: &str, detail: &str) {
    let session = bundle.session();
    let report = format!("Figure this error out: \"{}\"", detail);

    match session.create_direct_channel(bundle.owner()).await {
        Ok(channel) => {
            if let Err(e) = session.send_message(&channel, &report).await {
                tracing::error!(event = %bundle.log().event_id(), "Failed to report {} error to owner: {}", label, e);
                bundle.log().log(&format!("ESCALATE owner report failed: {}", e));
            }
        }
        Err(e) => {
            tracing::error!(event = %bundle.log().event_id(), "Failed to open owner channel: {}", e);
            bundle.log().log(&format!("ESCALATE owner channel failed: {}", e));
        }
    }

    let notice = format!("{} {}", session.mention(&bundle.message().author), FAILURE_REPLY);
    if let Err(e) = bundle.reply(&notice).await {
        tracing::error!(event = %bundle.log().event_id(), "Failed to send failure reply: {}", e);
        bundle.log().log(&format!("ESCALATE channel reply failed: {}", e));
    }
}
