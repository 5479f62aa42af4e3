//! Discord bot integration.
//!
//! The core only needs [`ChatSink`] to post into channels. The serenity
//! client and gateway handler live in [`client`].

pub mod client;
pub mod commands;
pub mod markdown;

use async_trait::async_trait;

use crate::common::error::ChatError;
use crate::common::types::{ChannelId, MessageId};

pub use client::{DiscordHandler, SerenityChat};
pub use commands::BotCommands;

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), ChatError>;

    async fn send_reply(&self, channel: ChannelId, text: &str, in_reply_to: MessageId) -> Result<(), ChatError>;
}
