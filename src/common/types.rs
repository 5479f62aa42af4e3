//! Shared types used across the application.

use std::fmt;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::error::LinkError;

/// Discord channel identifier.
pub type ChannelId = u64;

/// Discord message identifier.
pub type MessageId = u64;

/// Dotted-quad IPv4 host and port, no leading zeros in either part.
static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}",
        r"([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])",
        r":(\d|[1-9]\d{1,3}|[1-5]\d{4}|6[0-4]\d{3}|65[0-4]\d{2}|655[0-2]\d|6553[0-5])$",
    ))
    .expect("address pattern is a valid regex")
});

/// A game server address (`ip:port`) that passed syntax validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress(String);

impl ServerAddress {
    /// Validate and wrap an address string.
    pub fn parse(address: &str) -> Result<Self, LinkError> {
        if ADDRESS_PATTERN.is_match(address).unwrap_or(false) {
            Ok(Self(address.to_string()))
        } else {
            Err(LinkError::InvalidAddress {
                address: address.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServerAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A player as reported by the game server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Player {
    pub id: i32,
    pub name: String,
    pub clan: String,
    /// ISO 3166-1 numeric country code, -1 when unknown.
    pub country: i32,
    pub ip: String,
}

/// Enabled feature modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    DiscordLogging,
    VpnDetection,
}

impl Module {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DiscordLogging => "discord-logging",
            Self::VpnDetection => "vpn-detection",
        }
    }
}
