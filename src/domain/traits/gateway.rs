use std::sync::Arc;

use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::domain::entities::{Message, User};

/// Gateway trait - abstraction over a connected chat transport session.
///
/// Implementations must tolerate concurrent calls from in-flight events.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open the connection and begin delivering events
    async fn open(&self) -> Result<(), BotError>;

    /// Close the connection; no events are delivered afterwards
    async fn close(&self) -> Result<(), BotError>;

    /// The account this session is authenticated as
    async fn current_user(&self) -> Result<User, BotError>;

    /// Resolve (or create) the direct-message channel for a user
    async fn create_direct_channel(&self, user_id: &str) -> Result<String, BotError>;

    /// Send a message to a channel, returning the new message id
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<String, BotError>;

    /// Markup that pings `user` in a message sent through this transport
    fn mention(&self, user: &User) -> String {
        user.mention()
    }

    /// Install the handler invoked for each inbound message
    fn set_event_handler(&self, handler: Arc<dyn EventHandler>);
}

/// Receives inbound messages from a gateway
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_message(&self, session: Arc<dyn Gateway>, message: Message);
}

/// Establishes a gateway session from an authorization string
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, authorization: &str) -> Result<Arc<dyn Gateway>, BotError>;
}
