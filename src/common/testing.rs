//! Recording fakes for the bus, chat and store seams.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use crate::bus::{BusPublisher, BusSubscriber, Delivery};
use crate::common::error::{BusError, ChatError, StoreResult};
use crate::common::types::{ChannelId, MessageId};
use crate::discord::ChatSink;
use crate::vpn::{IpRange, RangeStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.lock())
    }
}

#[async_trait]
impl BusPublisher for RecordingPublisher {
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<(), BusError> {
        self.published.lock().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: serde_json::from_slice(&body)?,
        });
        Ok(())
    }
}

/// A subscriber that hands out a fixed list of deliveries, then ends the stream.
pub struct ScriptedSubscriber {
    deliveries: Mutex<Vec<Delivery>>,
}

impl ScriptedSubscriber {
    pub fn new(bodies: Vec<&str>) -> Self {
        Self {
            deliveries: Mutex::new(
                bodies
                    .into_iter()
                    .map(|body| Delivery {
                        body: body.as_bytes().to_vec(),
                        kind: None,
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl BusSubscriber for ScriptedSubscriber {
    async fn consume(&self, _queue: &str) -> Result<BoxStream<'static, Result<Delivery, BusError>>, BusError> {
        let deliveries = std::mem::take(&mut *self.deliveries.lock());
        Ok(stream::iter(deliveries.into_iter().map(Ok)).boxed())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub channel: ChannelId,
    pub text: String,
    pub in_reply_to: Option<MessageId>,
}

#[derive(Debug, Default)]
pub struct RecordingChat {
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), ChatError> {
        self.sent.lock().push(Sent {
            channel,
            text: text.to_string(),
            in_reply_to: None,
        });
        Ok(())
    }

    async fn send_reply(&self, channel: ChannelId, text: &str, in_reply_to: MessageId) -> Result<(), ChatError> {
        self.sent.lock().push(Sent {
            channel,
            text: text.to_string(),
            in_reply_to: Some(in_reply_to),
        });
        Ok(())
    }
}

/// Wraps a store and counts mutating calls.
pub struct CountingStore<S> {
    pub inner: S,
    pub inserts: Mutex<usize>,
    pub removes: Mutex<usize>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            inserts: Mutex::new(0),
            removes: Mutex::new(0),
        }
    }

    pub fn inserts(&self) -> usize {
        *self.inserts.lock()
    }

    pub fn removes(&self) -> usize {
        *self.removes.lock()
    }
}

#[async_trait]
impl<S: RangeStore> RangeStore for CountingStore<S> {
    async fn find(&self, ip: &str) -> StoreResult<Option<String>> {
        self.inner.find(ip).await
    }

    async fn insert(&self, range: &IpRange, reason: &str) -> StoreResult<()> {
        *self.inserts.lock() += 1;
        self.inner.insert(range, reason).await
    }

    async fn remove(&self, range: &IpRange) -> StoreResult<()> {
        *self.removes.lock() += 1;
        self.inner.remove(range).await
    }

    async fn last_modified(&self, path: &str) -> StoreResult<Option<DateTime<Utc>>> {
        self.inner.last_modified(path).await
    }

    async fn set_last_modified(&self, path: &str, modified: DateTime<Utc>) -> StoreResult<()> {
        self.inner.set_last_modified(path, modified).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }
}
