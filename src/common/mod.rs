//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use error::{AppError, Result};
pub use types::{ChannelId, MessageId, Module, Player, ServerAddress};
