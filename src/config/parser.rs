//! Configuration file parsing (HOCON format).

use std::path::Path;

use crate::common::error::ConfigError;
use crate::config::types::Config;
use hocon::HoconLoader;

/// Load configuration from a HOCON file.
///
/// A missing file yields the defaults so the service can be configured
/// from environment variables alone.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }

    HoconLoader::new()
        .load_file(path)
        .map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Load configuration from a HOCON string.
#[cfg(test)]
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    HoconLoader::new()
        .load_str(content)
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_full_config() {
        let config = load_config_str(
            r#"
            discord {
                token = "abc"
                links = [
                    { address = "10.0.0.1:8303", channel = 123456789 }
                ]
                skip_whisper = false
            }
            broker {
                address = "rabbit:5672"
                password = "secret"
            }
            modules {
                vpn_detection = true
            }
            vpn {
                ban_duration = "1h"
                broadcast_bans = true
            }
            "#,
        )
        .unwrap();

        assert_eq!(config.discord.token, "abc");
        assert_eq!(config.discord.links.len(), 1);
        assert_eq!(config.discord.links[0].channel, 123456789);
        assert!(!config.discord.skip_whisper);
        assert!(config.discord.skip_join_leave);
        assert_eq!(config.broker.address, "rabbit:5672");
        assert_eq!(config.broker.username, "tw-admin");
        assert!(config.modules.discord_logging);
        assert!(config.modules.vpn_detection);
        assert_eq!(config.vpn.ban_duration, "1h");
        assert_eq!(config.vpn.ban_reason, "VPN");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.conf")).unwrap();
        assert_eq!(config.broker.queue, "discord-moderation");
    }
}
