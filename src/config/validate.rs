//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::sync::LazyLock;
use std::time::Duration;

use fancy_regex::Regex;

use crate::common::error::ConfigError;
use crate::common::types::ServerAddress;
use crate::config::types::Config;

static FOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("folder pattern is a valid regex"));

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Validate Discord config
    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }

    for (i, link) in config.discord.links.iter().enumerate() {
        if ServerAddress::parse(&link.address).is_err() {
            errors.push(format!(
                "discord.links[{}].address '{}' is not a valid ip:port",
                i, link.address
            ));
        }
        if link.channel == 0 {
            errors.push(format!("discord.links[{}].channel must be non-zero", i));
        }
    }

    // Validate broker config
    if config.broker.address.is_empty() {
        errors.push("broker.address is required".to_string());
    }
    if config.broker.password.is_empty() {
        errors.push("broker.password is required".to_string());
    }
    if config.broker.queue.is_empty() {
        errors.push("broker.queue is required".to_string());
    }

    // VPN settings only matter when the module runs
    if config.modules.vpn_detection {
        let vpn = &config.vpn;
        for (field, folder) in [
            ("vpn.blacklist_folder", &vpn.blacklist_folder),
            ("vpn.whitelist_folder", &vpn.whitelist_folder),
        ] {
            if !FOLDER_PATTERN.is_match(folder).unwrap_or(false) {
                errors.push(format!(
                    "{} '{}' may only contain letters, digits and '-'",
                    field, folder
                ));
            }
        }
        if vpn.blacklist_folder == vpn.whitelist_folder {
            errors.push("vpn.blacklist_folder and vpn.whitelist_folder must differ".to_string());
        }
        if let Err(e) = parse_duration(&vpn.ban_duration) {
            errors.push(format!("vpn.ban_duration: {}", e));
        }
        if vpn.ban_command.trim().is_empty() {
            errors.push("vpn.ban_command is required".to_string());
        }
        if vpn.store_file.is_empty() {
            errors.push("vpn.store_file is required".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

/// Parse a Go-style duration such as `24h`, `90s` or `1h30m`.
///
/// Units: `ms`, `s`, `m`, `h`. Fractions are allowed (`1.5h`). A bare `0`
/// is zero.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        field: "duration".to_string(),
        message: format!("'{}' {}", value, message),
    };

    let value = value.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    if value.is_empty() {
        return Err(invalid("is empty"));
    }

    let mut total = 0f64;
    let mut rest = value;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("is missing a unit"))?;
        if number_len == 0 {
            return Err(invalid("has a unit without a number"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| invalid("has an invalid number"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos = match &rest[..unit_len] {
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid("has an unknown unit")),
        };
        rest = &rest[unit_len..];
        total += number * nanos;
    }

    Ok(Duration::from_nanos(total.round() as u64))
}
