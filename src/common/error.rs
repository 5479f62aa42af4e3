//! Error types for the application.

use std::fmt;

use thiserror::Error;

use crate::common::types::{ChannelId, ServerAddress};

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Discord error: {0}")]
    Chat(#[from] ChatError),

    #[error("Startup failed: {message}")]
    StartupFatal { message: String },
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// The side of a link a registry error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKey {
    Address(ServerAddress),
    Channel(ChannelId),
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKey::Address(address) => write!(f, "address {}", address),
            LinkKey::Channel(channel) => write!(f, "channel {}", channel),
        }
    }
}

/// Address-channel link registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("{key} is already linked")]
    AlreadyLinked { key: LinkKey },

    #[error("unknown {key}")]
    NotFound { key: LinkKey },
}

/// Malformed bus envelope or event payload.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed event: missing type")]
    MissingType,
}

/// Message bus errors (publish, consume, topology).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Failed to connect to broker at {address}: {message}")]
    ConnectFailed { address: String, message: String },

    #[error("Failed to bind queue '{queue}' to exchange '{exchange}': {message}")]
    BindFailed {
        queue: String,
        exchange: String,
        message: String,
    },

    #[error("Failed to consume from queue '{queue}': {message}")]
    ConsumeFailed { queue: String, message: String },

    #[error("Failed to publish to '{exchange}/{routing_key}': {message}")]
    PublishFailed {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// IP-range store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid IP range: {range}")]
    InvalidRange { range: String },

    #[error("invalid IP address: {ip}")]
    InvalidIp { ip: String },

    #[error("Store IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store snapshot is corrupt: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Chat platform errors.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Failed to send message to channel {channel}: {message}")]
    SendFailed { channel: ChannelId, message: String },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
