//! Bans joining players whose address is in a blacklisted range.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::common::messages::{tags, PlayerEvent};
use crate::common::types::ChannelId;
use crate::processors::{EventEnvelope, EventProcessor, ProcessorError};
use crate::vpn::{BanRequester, RangeStore};

pub struct VpnDetector {
    store: Arc<dyn RangeStore>,
    requester: BanRequester,
}

impl VpnDetector {
    pub fn new(store: Arc<dyn RangeStore>, requester: BanRequester) -> Self {
        Self { store, requester }
    }
}

#[async_trait]
impl EventProcessor for VpnDetector {
    fn name(&self) -> &'static str {
        "detect-vpn"
    }

    async fn process(&self, _channel: ChannelId, envelope: &EventEnvelope) -> Result<(), ProcessorError> {
        if envelope.event_type != tags::PLAYER_JOINED {
            return Ok(());
        }

        let event: PlayerEvent = serde_json::from_slice(&envelope.payload)
            .map_err(|e| ProcessorError::decode(&envelope.event_type, e))?;
        let ip = event.player.ip.as_str();

        let Some(reason) = self.store.find(ip).await? else {
            debug!("[NO VPN]: {}", ip);
            return Ok(());
        };

        let destination = self
            .requester
            .request_ban(&event.player, &reason, &envelope.source)
            .await?;
        info!(address = %envelope.source, "[IS VPN]: {} ({:?})", ip, destination);
        Ok(())
    }
}
