//! In-memory adapter - records every send, delivers messages on demand

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::application::errors::BotError;
use crate::domain::entities::{Message, User};
use crate::domain::traits::{Connector, EventHandler, Gateway};

/// A message passed to [`Gateway::send_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: String,
    pub text: String,
}

/// Gateway kept entirely in memory.
///
/// Useful for embedding the bot in another event loop and for tests: push
/// inbound messages with [`MemoryGateway::deliver`], inspect outbound ones with
/// [`MemoryGateway::sent`].
pub struct MemoryGateway {
    me: Weak<MemoryGateway>,
    user: User,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
    sent: Mutex<Vec<SentMessage>>,
    fail_sends: AtomicBool,
    open: AtomicBool,
    closed: AtomicBool,
}

impl MemoryGateway {
    /// `user` is the identity reported by `current_user`
    pub fn new(user: User) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            user,
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Channel id returned for a user's direct messages
    pub fn direct_channel_id(user_id: &str) -> String {
        format!("dm:{}", user_id)
    }

    /// Make every subsequent send (and DM channel lookup) fail
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn sent_to(&self, channel_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .map(|m| m.text)
            .collect()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Hand a message to the registered handler. Returns `false` when the
    /// gateway is not open or nothing is registered.
    pub async fn deliver(&self, message: Message) -> bool {
        if !self.is_open() {
            return false;
        }
        let handler = self.handler.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let (Some(handler), Some(session)) = (handler, self.me.upgrade()) else {
            return false;
        };
        handler.on_message(session, message).await;
        true
    }

    fn check_sends(&self) -> Result<(), BotError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BotError::Network("send refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn open(&self) -> Result<(), BotError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), BotError> {
        self.open.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn current_user(&self) -> Result<User, BotError> {
        Ok(self.user.clone())
    }

    async fn create_direct_channel(&self, user_id: &str) -> Result<String, BotError> {
        self.check_sends()?;
        Ok(Self::direct_channel_id(user_id))
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<String, BotError> {
        self.check_sends()?;
        let mut sent = self.sent.lock().unwrap_or_else(|p| p.into_inner());
        sent.push(SentMessage {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(sent.len().to_string())
    }

    fn set_event_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.handler.lock().unwrap_or_else(|p| p.into_inner()) = Some(handler);
    }
}

/// Hands out a shared [`MemoryGateway`], optionally refusing the credential
pub struct MemoryConnector {
    gateway: Arc<MemoryGateway>,
    accepted: Option<String>,
}

impl MemoryConnector {
    pub fn new(gateway: Arc<MemoryGateway>) -> Self {
        Self {
            gateway,
            accepted: None,
        }
    }

    /// Only accept this exact authorization string
    pub fn accepting(mut self, authorization: impl Into<String>) -> Self {
        self.accepted = Some(authorization.into());
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, authorization: &str) -> Result<Arc<dyn Gateway>, BotError> {
        match &self.accepted {
            Some(expected) if expected != authorization => {
                Err(BotError::Auth("credential rejected".to_string()))
            }
            _ => Ok(self.gateway.clone()),
        }
    }
}
