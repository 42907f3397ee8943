//! Execution context handed to every command

use std::sync::Arc;

use super::audit_log::AuditLog;
use crate::application::bot::Bot;
use crate::application::errors::BotError;
use crate::domain::entities::Message;
use crate::domain::traits::Gateway;

/// Per-event bundle: the session the event arrived on, the message itself,
/// a borrowed view of the owning bot, the matched token index and the event's
/// audit log. Lives only as long as one dispatch.
pub struct Bundle<'a> {
    bot: &'a Bot,
    session: Arc<dyn Gateway>,
    message: Message,
    cmd_index: usize,
    log: AuditLog,
}

impl<'a> Bundle<'a> {
    pub fn new(bot: &'a Bot, session: Arc<dyn Gateway>, message: Message, log: AuditLog) -> Self {
        Self {
            bot,
            session,
            message,
            cmd_index: 0,
            log,
        }
    }

    pub fn bot(&self) -> &'a Bot {
        self.bot
    }

    pub fn session(&self) -> &Arc<dyn Gateway> {
        &self.session
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn owner(&self) -> &str {
        self.bot.owner()
    }

    /// Index of the token that selected the running command.
    ///
    /// Set by the inline pass; `0` for prefix and custom commands.
    pub fn cmd_index(&self) -> usize {
        self.cmd_index
    }

    pub(crate) fn set_cmd_index(&mut self, index: usize) {
        self.cmd_index = index;
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    pub fn author_is_owner(&self) -> bool {
        self.message.author.id == self.bot.owner()
    }

    /// Send a message to the channel the event came from
    pub async fn reply(&self, text: &str) -> Result<String, BotError> {
        self.session.send_message(&self.message.channel_id, text).await
    }
}
