//! Pluggable event processors.
//!
//! Every inbound event that resolves to a linked channel is handed to each
//! registered processor in registration order.

pub mod discord_log;
pub mod vpn;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::common::error::{BusError, ChatError, EventError, StoreError};
use crate::common::types::{ChannelId, ServerAddress};

pub use discord_log::DiscordLog;
pub use vpn::VpnDetector;

/// A decoded inbound message, shared read-only with all processors.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event_type: String,
    pub source: ServerAddress,
    pub payload: Bytes,
}

/// Errors a processor may report back to the router.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("unable to decode {event_type}: {source}")]
    Decode {
        event_type: String,
        #[source]
        source: EventError,
    },

    #[error("{0}")]
    Chat(#[from] ChatError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Bus(#[from] BusError),
}

impl ProcessorError {
    pub fn decode(event_type: &str, error: serde_json::Error) -> Self {
        Self::Decode {
            event_type: event_type.to_string(),
            source: EventError::Decode(error),
        }
    }
}

#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn process(&self, channel: ChannelId, envelope: &EventEnvelope) -> Result<(), ProcessorError>;
}

/// Ordered list of processors.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn EventProcessor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, processor: Arc<dyn EventProcessor>) {
        self.processors.push(processor);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EventProcessor>> {
        self.processors.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
