//! Configuration type definitions.

use std::path::PathBuf;

use serde::Deserialize;

use crate::common::types::Module;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub broker: BrokerConfig,
    pub modules: ModulesConfig,
    pub vpn: VpnConfig,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    /// Links seeded at startup.
    pub links: Vec<LinkConfig>,
    /// JSON file the links are loaded from and saved to.
    pub links_file: Option<String>,
    /// Do not post join and leave events.
    pub skip_join_leave: bool,
    /// Do not post whispers.
    pub skip_whisper: bool,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            links: Vec::new(),
            links_file: None,
            skip_join_leave: true,
            skip_whisper: true,
        }
    }
}

/// Maps a game server address to a Discord channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkConfig {
    /// `ip:port` of the game server.
    pub address: String,
    /// Discord channel ID
    pub channel: u64,
}

/// Message broker connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// `host:port`
    pub address: String,
    pub username: String,
    pub password: String,
    /// Queue this service consumes.
    pub queue: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:5672".to_string(),
            username: "tw-admin".to_string(),
            password: String::new(),
            queue: "discord-moderation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub discord_logging: bool,
    pub vpn_detection: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            discord_logging: true,
            vpn_detection: false,
        }
    }
}

impl ModulesConfig {
    pub fn enabled(&self) -> Vec<Module> {
        let mut modules = Vec::new();
        if self.discord_logging {
            modules.push(Module::DiscordLogging);
        }
        if self.vpn_detection {
            modules.push(Module::VpnDetection);
        }
        modules
    }
}

/// VPN detection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VpnConfig {
    pub data_path: String,
    pub blacklist_folder: String,
    pub whitelist_folder: String,
    /// Reason for blacklist lines without a `# comment`.
    pub ban_reason: String,
    /// Go-style duration, e.g. `24h` or `1h30m`.
    pub ban_duration: String,
    pub broadcast_bans: bool,
    /// Tokens: `{IP}`, `{ID}`, `{DURATION:MINUTES}`, `{DURATION:SECONDS}`, `{REASON}`
    pub ban_command: String,
    /// Snapshot file of the range store.
    pub store_file: String,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            data_path: "./data".to_string(),
            blacklist_folder: "blacklists".to_string(),
            whitelist_folder: "whitelists".to_string(),
            ban_reason: "VPN".to_string(),
            ban_duration: "24h".to_string(),
            broadcast_bans: false,
            ban_command: "ban {IP} {DURATION:MINUTES} {REASON}".to_string(),
            store_file: "./data/ranges.json".to_string(),
        }
    }
}

impl VpnConfig {
    pub fn blacklist_root(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join(&self.blacklist_folder)
    }

    pub fn whitelist_root(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join(&self.whitelist_folder)
    }
}
