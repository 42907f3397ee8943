//! Console adapter for development/testing

use async_trait::async_trait;
use std::sync::{Arc, Mutex, Weak};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::application::errors::BotError;
use crate::domain::entities::{Message, User};
use crate::domain::traits::{Connector, EventHandler, Gateway};

/// Channel id used for lines typed on stdin
pub const CONSOLE_CHANNEL: &str = "console";

/// Console gateway: each stdin line is a message from the local user,
/// every send is printed to stdout.
pub struct ConsoleAdapter {
    me: Weak<ConsoleAdapter>,
    info: User,
    author: User,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleAdapter {
    /// `author_id` is the id stdin lines are attributed to
    pub fn new(author_id: impl Into<String>) -> Arc<Self> {
        let author = User::new(author_id).with_username("you");
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            info: User::new("ssx-bot").with_username("ssx-bot").as_bot(),
            author,
            handler: Mutex::new(None),
            reader: Mutex::new(None),
        })
    }

    fn handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.handler.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Gateway for ConsoleAdapter {
    async fn open(&self) -> Result<(), BotError> {
        tracing::info!("Starting console bot (dev mode)");
        let session: Arc<dyn Gateway> = self
            .me
            .upgrade()
            .ok_or_else(|| BotError::Internal("console adapter dropped".to_string()))?;
        let Some(handler) = self.handler() else {
            return Err(BotError::Transport("no event handler registered".to_string()));
        };
        let author = self.author.clone();

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let message = Message::new(CONSOLE_CHANNEL, author.clone(), line);
                        handler.on_message(Arc::clone(&session), message).await;
                    }
                    Ok(None) => {
                        tracing::info!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        });
        *self.reader.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
        Ok(())
    }

    async fn close(&self) -> Result<(), BotError> {
        if let Some(task) = self.reader.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<User, BotError> {
        Ok(self.info.clone())
    }

    async fn create_direct_channel(&self, user_id: &str) -> Result<String, BotError> {
        Ok(format!("dm:{}", user_id))
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<String, BotError> {
        println!("[BOT -> {}] {}", channel_id, text);
        Ok(uuid::Uuid::new_v4().to_string())
    }

    fn set_event_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.handler.lock().unwrap_or_else(|p| p.into_inner()) = Some(handler);
    }
}

/// Connects a [`ConsoleAdapter`]; the credential is not checked
pub struct ConsoleConnector {
    author_id: String,
}

impl ConsoleConnector {
    pub fn new(author_id: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
        }
    }
}

#[async_trait]
impl Connector for ConsoleConnector {
    async fn connect(&self, _authorization: &str) -> Result<Arc<dyn Gateway>, BotError> {
        Ok(ConsoleAdapter::new(self.author_id.clone()))
    }
}
