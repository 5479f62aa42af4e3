//! Inbound bus events: decode, resolve the linked channel, fan out.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bridge::registry::LinkRegistry;
use crate::bridge::shutdown;
use crate::bus::Delivery;
use crate::common::error::{BusError, EventError, LinkError};
use crate::common::messages::BaseEvent;
use crate::common::types::{ChannelId, ServerAddress};
use crate::discord::ChatSink;
use crate::processors::{EventEnvelope, EventProcessor, ProcessorChain};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Decode(#[from] EventError),

    #[error("no channel for source {address}: {reason}")]
    Unlinked { address: String, reason: LinkError },
}

/// What happened to one dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub channel: ChannelId,
    pub processed: usize,
    pub failed: usize,
}

pub struct EventRouter {
    registry: Arc<LinkRegistry>,
    chain: RwLock<ProcessorChain>,
    chat: Arc<dyn ChatSink>,
}

impl EventRouter {
    pub fn new(registry: Arc<LinkRegistry>, chat: Arc<dyn ChatSink>) -> Self {
        Self {
            registry,
            chain: RwLock::new(ProcessorChain::new()),
            chat,
        }
    }

    pub fn add_processor(&self, processor: Arc<dyn EventProcessor>) {
        let mut chain = self.chain.write();
        chain.push(processor);
        info!("Event processors: {:?}", *chain);
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.chain.read().names()
    }

    /// Run one raw bus message through every processor.
    ///
    /// `kind` is the message type header; it names the event when the body
    /// carries no `type` field.
    pub async fn dispatch(&self, body: &[u8], kind: Option<&str>) -> Result<DispatchOutcome, DispatchError> {
        let header: BaseEvent = serde_json::from_slice(body).map_err(EventError::Decode)?;
        let event_type = match (header.event_type.as_str(), kind) {
            ("", Some(kind)) if !kind.is_empty() => kind.to_string(),
            ("", _) => return Err(EventError::MissingType.into()),
            (event_type, _) => event_type.to_string(),
        };

        let unlinked = |reason| DispatchError::Unlinked {
            address: header.source.clone(),
            reason,
        };
        let source = ServerAddress::parse(&header.source).map_err(unlinked)?;
        let channel = self.registry.channel(source.as_str()).map_err(unlinked)?;

        let envelope = EventEnvelope {
            event_type,
            source,
            payload: Bytes::copy_from_slice(body),
        };

        // Processors run on a copy so no I/O happens under the lock.
        let chain = self.chain.read().clone();
        let mut outcome = DispatchOutcome {
            channel,
            processed: 0,
            failed: 0,
        };

        for processor in chain.iter() {
            match processor.process(channel, &envelope).await {
                Ok(()) => outcome.processed += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(
                        channel,
                        address = %envelope.source,
                        "Processor {} failed on {}: {}",
                        processor.name(),
                        envelope.event_type,
                        e
                    );
                    if let Err(send_error) = self.chat.send_message(channel, &format!("[ERROR]: {}", e)).await {
                        error!(channel, "Failed to report processor error: {}", send_error);
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Dispatch and log; failures never escape.
    pub async fn handle(&self, delivery: &Delivery) {
        match self.dispatch(&delivery.body, delivery.kind.as_deref()).await {
            Ok(outcome) => debug!(
                channel = outcome.channel,
                "Dispatched event to {} processors ({} failed)",
                outcome.processed + outcome.failed,
                outcome.failed
            ),
            Err(e) => warn!("Dropping bus message: {}", e),
        }
    }
}

/// Drain `deliveries` into `router` until shutdown or end of stream.
pub async fn run_event_loop(
    router: Arc<EventRouter>,
    mut deliveries: BoxStream<'static, Result<Delivery, BusError>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Event loop started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown::wait_for(&mut shutdown_rx) => {
                info!("Event loop received shutdown signal");
                break;
            }
            delivery = deliveries.next() => match delivery {
                Some(Ok(delivery)) => router.handle(&delivery).await,
                Some(Err(e)) => error!("Bus delivery failed: {}", e),
                None => {
                    warn!("Bus stream ended");
                    break;
                }
            },
        }
    }
    info!("Event loop stopped");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::common::error::StoreError;
    use crate::common::messages::tags;
    use crate::common::testing::RecordingChat;
    use crate::processors::ProcessorError;

    struct Tracking {
        name: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<(&'static str, String)>>>,
    }

    #[async_trait]
    impl EventProcessor for Tracking {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn process(&self, _channel: ChannelId, envelope: &EventEnvelope) -> Result<(), ProcessorError> {
            self.calls.lock().push((self.name, envelope.event_type.clone()));
            if self.fail {
                Err(ProcessorError::Store(StoreError::InvalidIp {
                    ip: "store down".to_string(),
                }))
            } else {
                Ok(())
            }
        }
    }

    const CHAT: &str = r#"{"type":"event:chat","source":"10.0.0.1:8303","player":{"name":"a"},"text":"hi"}"#;

    fn router() -> (Arc<RecordingChat>, EventRouter) {
        let registry = Arc::new(LinkRegistry::new());
        registry.add_link("10.0.0.1:8303", 42).unwrap();
        let chat = RecordingChat::new();
        (chat.clone(), EventRouter::new(registry, chat))
    }

    fn tracking(
        name: &'static str,
        fail: bool,
        calls: &Arc<Mutex<Vec<(&'static str, String)>>>,
    ) -> Arc<dyn EventProcessor> {
        Arc::new(Tracking {
            name,
            fail,
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn test_processors_run_in_registration_order() {
        let (_chat, router) = router();
        let calls = Arc::new(Mutex::new(Vec::new()));
        router.add_processor(tracking("first", false, &calls));
        router.add_processor(tracking("second", false, &calls));

        let outcome = router.dispatch(CHAT.as_bytes(), None).await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome {
                channel: 42,
                processed: 2,
                failed: 0
            }
        );
        assert_eq!(
            *calls.lock(),
            vec![("first", tags::CHAT.to_string()), ("second", tags::CHAT.to_string())]
        );
    }

    #[tokio::test]
    async fn test_failing_processor_reports_and_chain_continues() {
        let (chat, router) = router();
        let calls = Arc::new(Mutex::new(Vec::new()));
        router.add_processor(tracking("broken", true, &calls));
        router.add_processor(tracking("after", false, &calls));

        let outcome = router.dispatch(CHAT.as_bytes(), None).await.unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.processed, 1);
        assert_eq!(calls.lock().len(), 2);

        let sent = chat.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, 42);
        assert!(sent[0].text.starts_with("[ERROR]: "), "{}", sent[0].text);
        assert!(sent[0].text.contains("store down"));
    }

    #[tokio::test]
    async fn test_unlinked_source_is_dropped_silently() {
        let (chat, router) = router();
        let calls = Arc::new(Mutex::new(Vec::new()));
        router.add_processor(tracking("first", false, &calls));

        let body = r#"{"type":"event:chat","source":"10.0.0.2:8303"}"#;
        assert!(matches!(
            router.dispatch(body.as_bytes(), None).await,
            Err(DispatchError::Unlinked { .. })
        ));
        assert!(calls.lock().is_empty());
        assert!(chat.take().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_a_decode_error() {
        let (chat, router) = router();
        for body in ["not json", r#"{"type":"event:chat"}"#] {
            assert!(matches!(
                router.dispatch(body.as_bytes(), None).await,
                Err(DispatchError::Decode(_))
            ));
        }
        assert!(chat.take().is_empty());
    }

    #[tokio::test]
    async fn test_type_header_names_untyped_event() {
        let (_chat, router) = router();
        let calls = Arc::new(Mutex::new(Vec::new()));
        router.add_processor(tracking("first", false, &calls));

        let body = r#"{"source":"10.0.0.1:8303","player":{"name":"a"}}"#;
        router.dispatch(body.as_bytes(), Some(tags::PLAYER_JOINED)).await.unwrap();
        assert_eq!(*calls.lock(), vec![("first", tags::PLAYER_JOINED.to_string())]);

        assert!(matches!(
            router.dispatch(body.as_bytes(), None).await,
            Err(DispatchError::Decode(EventError::MissingType))
        ));
    }

    #[tokio::test]
    async fn test_body_type_wins_over_header() {
        let (_chat, router) = router();
        let calls = Arc::new(Mutex::new(Vec::new()));
        router.add_processor(tracking("first", false, &calls));

        router.dispatch(CHAT.as_bytes(), Some(tags::PLAYER_LEFT)).await.unwrap();
        assert_eq!(*calls.lock(), vec![("first", tags::CHAT.to_string())]);
    }

    #[tokio::test]
    async fn test_event_loop_survives_failed_delivery() {
        let (_chat, router) = router();
        let calls = Arc::new(Mutex::new(Vec::new()));
        router.add_processor(tracking("first", false, &calls));

        let deliveries = futures::stream::iter(vec![
            Err(BusError::ConsumeFailed {
                queue: "discord-moderation".to_string(),
                message: "channel reset".to_string(),
            }),
            Ok(Delivery {
                body: CHAT.as_bytes().to_vec(),
                kind: None,
            }),
        ])
        .chain(futures::stream::pending())
        .boxed();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_event_loop(Arc::new(router), deliveries, shutdown_rx));

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while calls.lock().is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("delivery after the failed one should be processed");
        assert!(!handle.is_finished());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("event loop should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_source_address_is_unlinked() {
        let (_chat, router) = router();
        let body = r#"{"type":"event:chat","source":"game-server"}"#;
        match router.dispatch(body.as_bytes(), None).await {
            Err(DispatchError::Unlinked { reason, .. }) => {
                assert!(matches!(reason, LinkError::InvalidAddress { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_loop_stops_on_shutdown() {
        let (_chat, router) = router();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pending = futures::stream::pending().boxed();

        let handle = tokio::spawn(run_event_loop(Arc::new(router), pending, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("event loop should exit")
            .unwrap();
    }
}
