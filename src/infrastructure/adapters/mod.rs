//! Transport adapters

pub mod console;
pub mod memory;
pub mod telegram;

pub use console::{ConsoleAdapter, ConsoleConnector};
pub use memory::{MemoryConnector, MemoryGateway, SentMessage};
pub use telegram::{TelegramAdapter, TelegramConnector};
