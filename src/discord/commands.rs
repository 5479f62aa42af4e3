//! Discord bot commands (!link, !unlink, !links, etc).
//!
//! Handles command parsing and execution. Replies are plain strings; the
//! gateway handler posts them back into the channel.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bridge::{LinkTarget, Service};
use crate::common::types::{ChannelId, Module};

/// Prefix that marks a message as a bot command rather than a server command.
pub const PREFIX: char = '!';

const HELP: &str = r#"**Available Commands:**
• `!ping` - Check that the bot is alive
• `!link <ip:port>` - Log events of a server into this channel
• `!unlink` - Stop logging into this channel
• `!unlink <ip:port>` - Remove the link of a server
• `!links` - List all links
• `!modules` - List enabled modules
• `!help` - Show this help message
Any other message in a linked channel is executed on its server."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Ping,
    Link(Option<String>),
    Unlink(Option<String>),
    Links,
    Modules,
    Help,
    Unknown(String),
}

impl BotCommand {
    /// Parse a `!`-prefixed message. Returns `None` for anything else.
    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        let rest = content.strip_prefix(PREFIX)?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?.to_lowercase();
        let argument = parts.next().map(str::to_string);

        let command = match name.as_str() {
            "ping" => Self::Ping,
            "link" => Self::Link(argument),
            "unlink" => Self::Unlink(argument),
            "links" => Self::Links,
            "modules" => Self::Modules,
            "help" => Self::Help,
            _ => Self::Unknown(name),
        };
        Some(command)
    }
}

/// Command handler for the Discord bot.
pub struct BotCommands {
    service: Arc<Service>,
    modules: Vec<Module>,
}

impl BotCommands {
    pub fn new(service: Arc<Service>, modules: Vec<Module>) -> Self {
        Self { service, modules }
    }

    /// Run `command` issued in `channel` and build the reply.
    pub fn execute(&self, channel: ChannelId, command: &BotCommand) -> String {
        debug!(channel, "Processing command: {:?}", command);

        match command {
            BotCommand::Ping => "Pong!".to_string(),
            BotCommand::Help => HELP.to_string(),
            BotCommand::Modules => self.handle_modules(),
            BotCommand::Links => self.handle_links(),
            BotCommand::Link(None) => "usage: `!link <ip:port>`".to_string(),
            BotCommand::Link(Some(address)) => self.handle_link(channel, address),
            BotCommand::Unlink(target) => self.handle_unlink(channel, target.as_deref()),
            BotCommand::Unknown(name) => format!("unknown command `{}{}`, try `!help`", PREFIX, name),
        }
    }

    fn logging_enabled(&self) -> Result<(), String> {
        if self.modules.contains(&Module::DiscordLogging) {
            Ok(())
        } else {
            Err("the discord logging module is disabled".to_string())
        }
    }

    fn handle_modules(&self) -> String {
        if self.modules.is_empty() {
            return "no modules enabled".to_string();
        }
        self.modules
            .iter()
            .map(Module::name)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn handle_links(&self) -> String {
        let links = self.service.registry().snapshot();
        if links.is_empty() {
            return "no links".to_string();
        }
        links
            .iter()
            .map(|(address, channel)| format!("`{}` -> <#{}>", address, channel))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn handle_link(&self, channel: ChannelId, address: &str) -> String {
        if let Err(e) = self.logging_enabled() {
            return e;
        }
        match self.service.add_link(address, channel) {
            Ok(()) => {
                info!(channel, address, "Linked via bot command");
                format!("established connection between this channel and {}", address)
            }
            Err(e) => format!(
                "failed to establish link between this channel and {}: {}",
                address, e
            ),
        }
    }

    fn handle_unlink(&self, channel: ChannelId, address: Option<&str>) -> String {
        if let Err(e) = self.logging_enabled() {
            return e;
        }
        match address {
            None => match self.service.remove_link(LinkTarget::Channel(channel)) {
                Ok((address, _)) => format!("unlinked this channel from address {}", address),
                Err(e) => format!("failed to unlink channel: {}", e),
            },
            Some(address) => match self.service.remove_link(LinkTarget::Address(address.to_string())) {
                Ok((address, channel)) => format!("unlinked address {} from channel <#{}>", address, channel),
                Err(e) => format!("failed to unlink {}: {}", address, e),
            },
        }
    }
}
