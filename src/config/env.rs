//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `MODERATION_DISCORD_TOKEN` - Discord bot token
//! - `MODERATION_BROKER_ADDRESS` - broker `host:port`
//! - `MODERATION_BROKER_USER` - broker username
//! - `MODERATION_BROKER_PASSWORD` - broker password
//! - `MODERATION_STORE_FILE` - IP range store snapshot file
//! - `MODERATION_ADDRESS_CHANNEL_MAPPING` - extra links, `addr->channel,addr->channel`
//! - `MODERATION_PAIR_DELIMITER` / `MODERATION_KEY_VALUE_DELIMITER` - mapping syntax

use std::env;

use crate::common::error::ConfigError;
use crate::config::types::{Config, LinkConfig};

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "MODERATION";

const DEFAULT_PAIR_DELIMITER: &str = ",";
const DEFAULT_KEY_VALUE_DELIMITER: &str = "->";

fn var(name: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

/// Apply environment variable overrides to a config.
///
/// Links from the mapping variable are appended to the configured ones.
pub fn apply_env_overrides(mut config: Config) -> Result<Config, ConfigError> {
    if let Some(token) = var("DISCORD_TOKEN") {
        config.discord.token = token;
    }

    // Broker
    if let Some(address) = var("BROKER_ADDRESS") {
        config.broker.address = address;
    }
    if let Some(username) = var("BROKER_USER") {
        config.broker.username = username;
    }
    if let Some(password) = var("BROKER_PASSWORD") {
        config.broker.password = password;
    }

    if let Some(store_file) = var("STORE_FILE") {
        config.vpn.store_file = store_file;
    }

    if let Some(mapping) = var("ADDRESS_CHANNEL_MAPPING") {
        let pair_delimiter = var("PAIR_DELIMITER").unwrap_or_else(|| DEFAULT_PAIR_DELIMITER.to_string());
        let key_value_delimiter =
            var("KEY_VALUE_DELIMITER").unwrap_or_else(|| DEFAULT_KEY_VALUE_DELIMITER.to_string());
        let links = parse_mapping(&mapping, &pair_delimiter, &key_value_delimiter)?;
        config.discord.links.extend(links);
    }

    Ok(config)
}

/// Parse `addr->channel,addr->channel` into links.
///
/// Empty pairs are skipped, so a trailing delimiter is fine.
pub fn parse_mapping(
    mapping: &str,
    pair_delimiter: &str,
    key_value_delimiter: &str,
) -> Result<Vec<LinkConfig>, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        field: format!("{}_ADDRESS_CHANNEL_MAPPING", ENV_PREFIX),
        message,
    };

    if pair_delimiter.is_empty() || key_value_delimiter.is_empty() {
        return Err(invalid("delimiters must not be empty".to_string()));
    }

    let mut links = Vec::new();
    for pair in mapping.split(pair_delimiter) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let (address, channel) = pair
            .split_once(key_value_delimiter)
            .ok_or_else(|| invalid(format!("'{}' is missing '{}'", pair, key_value_delimiter)))?;
        let channel = channel
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(format!("'{}' has an invalid channel id: {}", pair, e)))?;

        links.push(LinkConfig {
            address: address.trim().to_string(),
            channel,
        });
    }
    Ok(links)
}

/// Check if any sensitive environment variables are set but empty.
///
/// Returns a list of variable names that are set but empty.
pub fn check_empty_env_vars() -> Vec<String> {
    let vars = [
        format!("{}_DISCORD_TOKEN", ENV_PREFIX),
        format!("{}_BROKER_PASSWORD", ENV_PREFIX),
    ];

    vars.into_iter()
        .filter(|var| env::var(var).map(|v| v.is_empty()).unwrap_or(false))
        .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `MODERATION_CONFIG` environment variable, otherwise returns "moderation.conf".
pub fn get_config_path() -> String {
    var("CONFIG").unwrap_or_else(|| "moderation.conf".to_string())
}
