//! Telegram adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::application::errors::BotError;
use crate::domain::entities;
use crate::domain::traits::{Connector, EventHandler, Gateway};

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Pause before polling again after a failed getUpdates
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize)]
struct Response<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> Response<T> {
    fn into_result(self) -> Result<T, BotError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(BotError::Transport(
                self.description.unwrap_or_else(|| "Telegram API error".to_string()),
            )),
        }
    }
}

impl From<User> for entities::User {
    fn from(user: User) -> Self {
        // Only the @handle is kept; first names cannot be mentioned
        let mut out = entities::User::new(user.id.to_string());
        out.username = user.username;
        out.is_bot = user.is_bot;
        out
    }
}

/// Telegram bot adapter using long polling
pub struct TelegramAdapter {
    me: Weak<TelegramAdapter>,
    token: String,
    client: Client,
    poll_timeout: i64,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>, poll_timeout: i64) -> Arc<Self> {
        let token = token.into();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            token,
            // Long polls must outlive the server-side wait
            client: Client::builder()
                .timeout(Duration::from_secs(poll_timeout.max(0) as u64 + 30))
                .build()
                .unwrap_or_default(),
            poll_timeout,
            handler: Mutex::new(None),
            poller: Mutex::new(None),
        })
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    async fn call<Req, Res>(&self, method: &str, request: &Req) -> Result<Res, BotError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> Deserialize<'de>,
    {
        let response = self.client
            .post(self.api_url(method))
            .json(request)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let data: Response<Res> = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        data.into_result()
    }

    /// Get updates from Telegram using getUpdates API
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotError> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: i64,
            allowed_updates: Vec<String>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout,
            allowed_updates: vec!["message".to_string()],
        };
        self.call("getUpdates", &request).await
    }

    /// Get the next update offset
    pub fn get_next_offset(updates: &[Update], current: i64) -> i64 {
        updates.iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(current)
    }

    /// Convert a text update into a domain message
    pub fn to_message(update: &Update) -> Option<entities::Message> {
        let message = update.message.as_ref()?;
        let text = message.text.clone()?;
        let author = message.from.clone()?;
        let out = entities::Message::new(message.chat.id.to_string(), author.into(), text)
            .with_id(message.message_id.to_string());
        Some(match serde_json::to_value(message) {
            Ok(raw) => out.with_raw(raw),
            Err(_) => out,
        })
    }

    async fn poll(self: Arc<Self>, handler: Arc<dyn EventHandler>) {
        let session: Arc<dyn Gateway> = self.clone();
        let mut offset = 0;
        tracing::info!("Starting Telegram polling loop");

        loop {
            match self.get_updates(offset).await {
                Ok(updates) => {
                    offset = Self::get_next_offset(&updates, offset);
                    for update in &updates {
                        if let Some(message) = Self::to_message(update) {
                            handler.on_message(Arc::clone(&session), message).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to get updates: {}", e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl Gateway for TelegramAdapter {
    async fn open(&self) -> Result<(), BotError> {
        let this = self
            .me
            .upgrade()
            .ok_or_else(|| BotError::Internal("telegram adapter dropped".to_string()))?;
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| BotError::Transport("no event handler registered".to_string()))?;

        let task = tokio::spawn(this.poll(handler));
        if let Some(old) = self.poller.lock().unwrap_or_else(|p| p.into_inner()).replace(task) {
            old.abort();
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BotError> {
        if let Some(task) = self.poller.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
            tracing::info!("Stopped Telegram polling loop");
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<entities::User, BotError> {
        let me: User = self.call("getMe", &serde_json::json!({})).await?;
        Ok(me.into())
    }

    async fn create_direct_channel(&self, user_id: &str) -> Result<String, BotError> {
        // A private chat's id is the user's id
        Ok(user_id.to_string())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, BotError> {
        #[derive(Serialize)]
        struct SendMessageRequest<'a> {
            chat_id: &'a str,
            text: &'a str,
        }

        #[derive(Deserialize)]
        struct MessageResult {
            message_id: i64,
        }

        tracing::debug!("Sending to {}: {}", chat_id, text);
        let sent: MessageResult = self
            .call("sendMessage", &SendMessageRequest { chat_id, text })
            .await?;
        Ok(sent.message_id.to_string())
    }

    /// `@username` when the author has a handle, otherwise a user link
    fn mention(&self, user: &entities::User) -> String {
        match &user.username {
            Some(username) => format!("@{}", username),
            None => format!("tg://user?id={}", user.id),
        }
    }

    fn set_event_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.handler.lock().unwrap_or_else(|p| p.into_inner()) = Some(handler);
    }
}

/// Builds a [`TelegramAdapter`] from a `Bot <token>` authorization
pub struct TelegramConnector {
    poll_timeout: i64,
}

impl TelegramConnector {
    pub fn new(poll_timeout: i64) -> Self {
        Self { poll_timeout }
    }
}

#[async_trait]
impl Connector for TelegramConnector {
    async fn connect(&self, authorization: &str) -> Result<Arc<dyn Gateway>, BotError> {
        let token = authorization.strip_prefix("Bot ").unwrap_or(authorization).trim();
        if token.is_empty() {
            return Err(BotError::Auth("empty bot token".to_string()));
        }
        Ok(TelegramAdapter::new(token, self.poll_timeout))
    }
}
