//! Configuration parsing, environment overrides and validation.

pub mod env;
pub mod links;
pub mod parser;
pub mod types;
pub mod validate;

use std::path::Path;

pub use links::{load_links_file, save_links_file};
pub use parser::load_config;
pub use types::*;
pub use validate::{parse_duration, validate_config};

use crate::common::error::ConfigError;

/// Load the config file, apply environment overrides, then validate.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let empty = env::check_empty_env_vars();
    if !empty.is_empty() {
        tracing::warn!("Environment variables set but empty: {}", empty.join(", "));
    }

    let config = env::apply_env_overrides(load_config(path)?)?;
    validate_config(&config)?;
    Ok(config)
}
