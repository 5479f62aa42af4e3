//! Links file: a JSON object mapping `ip:port` to a channel id string.

use std::collections::BTreeMap;
use std::path::Path;

use crate::common::error::ConfigError;
use crate::config::types::LinkConfig;

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::IoError {
        path: path.display().to_string(),
        source,
    }
}

/// Read links from `path`. A missing file has no links.
pub fn load_links_file(path: impl AsRef<Path>) -> Result<Vec<LinkConfig>, ConfigError> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, e)),
    };

    let links: BTreeMap<String, String> =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: format!("{}: {}", path.display(), e),
        })?;

    links
        .into_iter()
        .map(|(address, channel)| {
            let channel = channel.parse().map_err(|_| ConfigError::InvalidValue {
                field: address.clone(),
                message: format!("'{}' is not a channel id", channel),
            })?;
            Ok(LinkConfig { address, channel })
        })
        .collect()
}

/// Write `links` (address -> channel id string) to `path`, replacing it.
pub fn save_links_file(path: impl AsRef<Path>, links: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let content = serde_json::to_string_pretty(links).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).map_err(|e| io_error(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}
