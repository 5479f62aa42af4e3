//! Message bus interfaces.
//!
//! The core only talks to the broker through [`BusPublisher`] and
//! [`BusSubscriber`]. The AMQP implementation lives in [`amqp`].

pub mod amqp;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::common::error::BusError;
use crate::common::types::ServerAddress;

/// Exchange that reaches every connected game server.
pub const BROADCAST_TOPIC: &str = "broadcast";

/// Default exchange; the routing key names the target queue directly.
pub const DIRECT_EXCHANGE: &str = "";

/// A raw message received from the bus.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Vec<u8>,
    /// Message type header, if the publisher set one.
    pub kind: Option<String>,
}

/// Where a published message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The queue of a single game server.
    Server(ServerAddress),
    /// Every connected game server.
    Broadcast,
}

impl Destination {
    /// The `(exchange, routing_key)` pair for this destination.
    pub fn route(&self) -> (&str, &str) {
        match self {
            Destination::Server(address) => (DIRECT_EXCHANGE, address.as_str()),
            Destination::Broadcast => (BROADCAST_TOPIC, ""),
        }
    }
}

#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<(), BusError>;

    async fn publish_to(&self, destination: &Destination, body: Vec<u8>) -> Result<(), BusError> {
        let (exchange, routing_key) = destination.route();
        self.publish(exchange, routing_key, body).await
    }
}

#[async_trait]
pub trait BusSubscriber: Send + Sync {
    async fn consume(&self, queue: &str) -> Result<BoxStream<'static, Result<Delivery, BusError>>, BusError>;
}
