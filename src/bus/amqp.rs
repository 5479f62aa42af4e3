//! AMQP broker adapter built on lapin.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures::stream::{BoxStream, StreamExt};
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{info, warn};

use crate::bus::{BusPublisher, BusSubscriber, Delivery};
use crate::common::error::BusError;
use crate::config::types::BrokerConfig;

const CONSUMER_TAG: &str = "discord-moderation";

/// Connection to the broker with one channel for publishing and one for consuming.
pub struct AmqpBus {
    connection: Connection,
    publish_channel: Channel,
    consume_channel: Channel,
}

impl AmqpBus {
    /// Connect to the broker, retrying a few times before giving up.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BusError> {
        let uri = format!(
            "amqp://{}:{}@{}/%2f",
            config.username, config.password, config.address
        );

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(5);

        let connection = (|| async { Connection::connect(&uri, ConnectionProperties::default()).await })
            .retry(backoff)
            .notify(|error, delay| {
                warn!(
                    "Broker connection failed: {}. Retrying in {:.1}s...",
                    error,
                    delay.as_secs_f64()
                );
            })
            .await
            .map_err(|e| BusError::ConnectFailed {
                address: config.address.clone(),
                message: e.to_string(),
            })?;

        let publish_channel = create_channel(&connection, &config.address).await?;
        let consume_channel = create_channel(&connection, &config.address).await?;

        info!("Connected to broker at {}", config.address);

        Ok(Self {
            connection,
            publish_channel,
            consume_channel,
        })
    }

    /// Declare `queue` and bind it to one fanout exchange per topic.
    pub async fn declare_and_bind(&self, queue: &str, exchanges: &[&str]) -> Result<(), BusError> {
        self.consume_channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| BusError::BindFailed {
                queue: queue.to_string(),
                exchange: String::new(),
                message: e.to_string(),
            })?;

        for exchange in exchanges {
            let bind_error = |e: lapin::Error| BusError::BindFailed {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                message: e.to_string(),
            };

            self.consume_channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Fanout,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(bind_error)?;

            self.consume_channel
                .queue_bind(queue, exchange, "", QueueBindOptions::default(), FieldTable::default())
                .await
                .map_err(bind_error)?;
        }

        info!("Queue '{}' bound to {} exchanges", queue, exchanges.len());
        Ok(())
    }

    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!("Failed to close broker connection: {}", e);
        }
    }
}

async fn create_channel(connection: &Connection, address: &str) -> Result<Channel, BusError> {
    connection
        .create_channel()
        .await
        .map_err(|e| BusError::ConnectFailed {
            address: address.to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl BusPublisher for AmqpBus {
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<(), BusError> {
        let publish_error = |e: lapin::Error| BusError::PublishFailed {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message: e.to_string(),
        };

        self.publish_channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;
        Ok(())
    }
}

#[async_trait]
impl BusSubscriber for AmqpBus {
    async fn consume(&self, queue: &str) -> Result<BoxStream<'static, Result<Delivery, BusError>>, BusError> {
        let consumer = self
            .consume_channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::ConsumeFailed {
                queue: queue.to_string(),
                message: e.to_string(),
            })?;

        let queue = queue.to_string();
        let deliveries = consumer.map(move |delivery| match delivery {
            Ok(delivery) => Ok(Delivery {
                kind: delivery
                    .properties
                    .kind()
                    .as_ref()
                    .map(|kind| kind.as_str().to_string()),
                body: delivery.data,
            }),
            Err(e) => Err(BusError::ConsumeFailed {
                queue: queue.clone(),
                message: e.to_string(),
            }),
        });

        Ok(deliveries.boxed())
    }
}
