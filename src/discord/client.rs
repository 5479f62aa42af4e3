//! Serenity glue: outbound messages and the gateway event handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::builder::CreateMessage;
use serenity::http::{Http, HttpBuilder};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bridge::shutdown;
use crate::bridge::{ChatCommand, LinkRegistry, Service};
use crate::common::error::ChatError;
use crate::common::types::{ChannelId, MessageId};
use crate::discord::commands::{BotCommand, BotCommands};
use crate::discord::markdown::truncate;
use crate::discord::ChatSink;

/// Longest message Discord accepts.
pub const MESSAGE_LIMIT: usize = 2000;

/// Build a serenity HTTP client with request timeouts.
pub fn build_http(token: &str) -> anyhow::Result<Http> {
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    Ok(HttpBuilder::new(token).client(reqwest_client).build())
}

/// Build the gateway client around `handler`.
pub async fn build_client(token: &str, handler: DiscordHandler) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILDS;

    let client = serenity::client::ClientBuilder::new_with_http(build_http(token)?, intents)
        .event_handler(handler)
        .await?;
    Ok(client)
}

/// Run the gateway until it stops on its own or shutdown is raised.
pub async fn run_gateway(mut client: Client, mut shutdown_rx: watch::Receiver<bool>) {
    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => match result {
            Ok(()) => info!("Discord client disconnected normally"),
            Err(e) => error!("Discord client error: {}", e),
        },
        _ = shutdown::wait_for(&mut shutdown_rx) => {
            info!("Initiating graceful Discord shutdown...");
            shard_manager.shutdown_all().await;
            info!("Discord shutdown complete");
        }
    }
}

fn channel_id(channel: ChannelId) -> Result<id::ChannelId, ChatError> {
    if channel == 0 {
        return Err(ChatError::SendFailed {
            channel,
            message: "channel id must be non-zero".to_string(),
        });
    }
    Ok(id::ChannelId::new(channel))
}

/// Only messages in linked channels become server commands. A link removed
/// after this check still gets the router's in-channel error reply.
fn is_linked(registry: &LinkRegistry, channel: ChannelId) -> bool {
    registry.address(channel).is_ok()
}

/// [`ChatSink`] over the Discord REST API.
pub struct SerenityChat {
    http: Arc<Http>,
}

impl SerenityChat {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatSink for SerenityChat {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), ChatError> {
        channel_id(channel)?
            .say(&self.http, truncate(text, MESSAGE_LIMIT))
            .await?;
        Ok(())
    }

    async fn send_reply(&self, channel: ChannelId, text: &str, in_reply_to: MessageId) -> Result<(), ChatError> {
        let channel = channel_id(channel)?;
        let mut builder = CreateMessage::new().content(truncate(text, MESSAGE_LIMIT));
        if in_reply_to != 0 {
            builder = builder.reference_message((channel, id::MessageId::new(in_reply_to)));
        }
        channel.send_message(&*self.http, builder).await?;
        Ok(())
    }
}

/// Gateway event handler.
///
/// `!`-prefixed messages are bot commands; everything else is queued as a
/// server command for the channel it was posted in.
pub struct DiscordHandler {
    service: Arc<Service>,
    commands: BotCommands,
}

impl DiscordHandler {
    pub fn new(service: Arc<Service>, commands: BotCommands) -> Self {
        Self { service, commands }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore our own messages
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        if msg.author.bot || msg.guild_id.is_none() {
            return;
        }

        let content = msg.content.trim();
        if content.is_empty() {
            return;
        }

        let channel = msg.channel_id.get();
        if let Some(command) = BotCommand::parse(content) {
            info!(channel, "Bot command from {}: {}", msg.author.name, content);
            let reply = self.commands.execute(channel, &command);
            if let Err(e) = msg.channel_id.say(&ctx.http, truncate(&reply, MESSAGE_LIMIT)).await {
                error!(channel, "Failed to reply to bot command: {}", e);
            }
            return;
        }

        if !is_linked(self.service.registry(), channel) {
            debug!(channel, "Ignoring message in unlinked channel");
            return;
        }

        debug!(channel, "Queueing server command from {}", msg.author.name);
        let command = ChatCommand {
            channel,
            message_id: msg.id.get(),
            content: msg.content.clone(),
        };
        if let Err(e) = self.service.command(command) {
            warn!(channel, "Dropping server command: {}", e);
            if let Err(e) = msg.reply(&ctx, e.to_string()).await {
                error!(channel, "Failed to reply: {}", e);
            }
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "Discord bot connected as {} ({} links)",
            ready.user.name,
            self.service.registry().len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_channel_is_rejected() {
        assert!(matches!(channel_id(0), Err(ChatError::SendFailed { channel: 0, .. })));
        assert_eq!(channel_id(42).unwrap().get(), 42);
    }

    #[test]
    fn test_only_linked_channels_forward_commands() {
        let registry = LinkRegistry::new();
        registry.add_link("10.0.0.1:8303", 42).unwrap();

        assert!(is_linked(&registry, 42));
        assert!(!is_linked(&registry, 7));

        registry.remove_by_channel(42).unwrap();
        assert!(!is_linked(&registry, 42));
    }
}
