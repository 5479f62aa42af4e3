//! The running bridge: owns the registry, both loops and the shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::commands::{run_command_loop, ChatCommand, CommandQueue, CommandRouter, EnqueueError};
use crate::bridge::events::{run_event_loop, EventRouter};
use crate::bridge::registry::LinkRegistry;
use crate::bridge::shutdown::{Shutdown, SHUTDOWN_GRACE};
use crate::bus::{BusPublisher, BusSubscriber};
use crate::common::error::{AppError, LinkError, Result};
use crate::common::types::{ChannelId, ServerAddress};
use crate::discord::ChatSink;
use crate::processors::EventProcessor;

/// Which side of a link to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Address(String),
    Channel(ChannelId),
}

pub struct Service {
    registry: Arc<LinkRegistry>,
    events: Arc<EventRouter>,
    commands: Arc<CommandRouter>,
    chat: Arc<dyn ChatSink>,
    queue: CommandQueue,
    pending_commands: Mutex<Option<mpsc::Receiver<ChatCommand>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shutdown: Shutdown,
}

impl Service {
    pub fn new(
        registry: Arc<LinkRegistry>,
        chat: Arc<dyn ChatSink>,
        publisher: Arc<dyn BusPublisher>,
        shutdown: Shutdown,
    ) -> Self {
        let (queue, rx) = CommandQueue::new();
        Self {
            events: Arc::new(EventRouter::new(registry.clone(), chat.clone())),
            commands: Arc::new(CommandRouter::new(registry.clone(), publisher)),
            registry,
            chat,
            queue,
            pending_commands: Mutex::new(Some(rx)),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    pub fn add_link(&self, address: &str, channel: ChannelId) -> std::result::Result<(), LinkError> {
        self.registry.add_link(address, channel)?;
        info!(channel, address, "Linked");
        Ok(())
    }

    /// Remove a link by either side, returning the pair that was removed.
    pub fn remove_link(&self, target: LinkTarget) -> std::result::Result<(ServerAddress, ChannelId), LinkError> {
        let removed = match target {
            LinkTarget::Address(address) => {
                let channel = self.registry.remove_by_address(&address)?;
                (ServerAddress::parse(&address)?, channel)
            }
            LinkTarget::Channel(channel) => (self.registry.remove_by_channel(channel)?, channel),
        };
        info!(channel = removed.1, address = %removed.0, "Unlinked");
        Ok(removed)
    }

    /// Queue a chat message for forwarding. Never blocks.
    pub fn command(&self, command: ChatCommand) -> std::result::Result<(), EnqueueError> {
        if self.shutdown.is_triggered() {
            return Err(EnqueueError::Closed);
        }
        self.queue.enqueue(command)
    }

    pub fn add_event_processor(&self, processor: Arc<dyn EventProcessor>) {
        self.events.add_processor(processor);
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.events.processor_names()
    }

    /// Start consuming `queue` and spawn both loops. Later calls do nothing.
    pub async fn start(&self, subscriber: &dyn BusSubscriber, queue: &str) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(AppError::StartupFatal {
                message: "service has already been shut down".to_string(),
            });
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let deliveries = match subscriber.consume(queue).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(AppError::StartupFatal {
                    message: e.to_string(),
                });
            }
        };

        let commands = self.pending_commands.lock().take().ok_or_else(|| AppError::StartupFatal {
            message: "command queue receiver already taken".to_string(),
        })?;

        let event_loop = tokio::spawn(run_event_loop(
            self.events.clone(),
            deliveries,
            self.shutdown.subscribe(),
        ));
        let command_loop = tokio::spawn(run_command_loop(
            self.commands.clone(),
            self.chat.clone(),
            commands,
            self.shutdown.subscribe(),
        ));
        self.tasks.lock().extend([event_loop, command_loop]);

        info!(
            "Service consuming '{}' with processors {:?}",
            queue,
            self.processor_names()
        );
        Ok(())
    }

    /// Raise the shutdown signal and give both loops a grace period to finish.
    pub async fn shutdown(&self) {
        if self.shutdown.trigger() {
            info!("Shutting down service");
        }
        // Never started: dropping the receiver closes the queue.
        self.pending_commands.lock().take();

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        for mut task in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!("Loop did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                task.abort();
            }
        }
        info!("Service stopped");
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use super::*;
    use crate::bus::Delivery;
    use crate::common::error::BusError;
    use crate::common::testing::{RecordingChat, RecordingPublisher, ScriptedSubscriber};
    use crate::processors::DiscordLog;

    struct Unreachable;

    #[async_trait]
    impl BusSubscriber for Unreachable {
        async fn consume(&self, queue: &str) -> std::result::Result<BoxStream<'static, std::result::Result<Delivery, BusError>>, BusError> {
            Err(BusError::ConsumeFailed {
                queue: queue.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn service() -> (Arc<RecordingChat>, Arc<RecordingPublisher>, Service) {
        let chat = RecordingChat::new();
        let publisher = RecordingPublisher::new();
        let service = Service::new(
            Arc::new(LinkRegistry::new()),
            chat.clone(),
            publisher.clone(),
            Shutdown::new(),
        );
        (chat, publisher, service)
    }

    fn command(channel: ChannelId, content: &str) -> ChatCommand {
        ChatCommand {
            channel,
            message_id: 1,
            content: content.to_string(),
        }
    }

    async fn eventually(mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_remove_link_by_either_side() {
        let (_chat, _publisher, service) = service();
        service.add_link("10.0.0.1:8303", 42).unwrap();
        service.add_link("10.0.0.2:8303", 43).unwrap();

        let (address, channel) = service
            .remove_link(LinkTarget::Address("10.0.0.1:8303".to_string()))
            .unwrap();
        assert_eq!((address.as_str(), channel), ("10.0.0.1:8303", 42));

        let (address, channel) = service.remove_link(LinkTarget::Channel(43)).unwrap();
        assert_eq!((address.as_str(), channel), ("10.0.0.2:8303", 43));
        assert!(service.registry().is_empty());

        assert!(matches!(
            service.remove_link(LinkTarget::Channel(43)),
            Err(LinkError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_events_reach_linked_channel() {
        let (chat, _publisher, service) = service();
        service.add_link("10.0.0.1:8303", 42).unwrap();
        service.add_event_processor(Arc::new(DiscordLog::new(chat.clone(), true, true)));

        let subscriber = ScriptedSubscriber::new(vec![
            r#"{"type":"event:chat","source":"10.0.0.2:8303","player":{"name":"x"},"text":"lost"}"#,
            r#"{"type":"event:chat","source":"10.0.0.1:8303","player":{"id":1,"name":"a"},"text":"hi"}"#,
        ]);
        service.start(&subscriber, "discord-moderation").await.unwrap();

        eventually(|| !chat.sent.lock().is_empty()).await;
        let sent = chat.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, 42);
        assert_eq!(sent[0].text, "[chat] `a` (1): hi");

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_commands_published_to_linked_server() {
        let (chat, publisher, service) = service();
        service.add_link("10.0.0.1:8303", 42).unwrap();
        service
            .start(&ScriptedSubscriber::new(vec![]), "discord-moderation")
            .await
            .unwrap();

        service.command(command(42, "status\n")).unwrap();
        service.command(command(77, "status")).unwrap();

        eventually(|| !chat.sent.lock().is_empty()).await;
        let published = publisher.take();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "10.0.0.1:8303");
        assert_eq!(published[0].body["command"], "status");

        let sent = chat.take();
        assert_eq!(sent[0].channel, 77);
        assert_eq!(sent[0].in_reply_to, Some(1));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (_chat, _publisher, service) = service();
        let subscriber = ScriptedSubscriber::new(vec![]);
        service.start(&subscriber, "q").await.unwrap();
        service.start(&subscriber, "q").await.unwrap();
        assert_eq!(service.tasks.lock().len(), 2);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_consume_failure_is_fatal() {
        let (_chat, _publisher, service) = service();
        match service.start(&Unreachable, "q").await {
            Err(AppError::StartupFatal { message }) => assert!(message.contains("connection refused")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_stops_loops_and_rejects_commands() {
        let (_chat, _publisher, service) = service();
        service.start(&ScriptedSubscriber::new(vec![]), "q").await.unwrap();
        assert!(service.is_running());

        tokio::time::timeout(Duration::from_secs(3), service.shutdown())
            .await
            .expect("shutdown should finish");

        assert!(service.tasks.lock().is_empty());
        assert!(!service.is_running());
        assert_eq!(service.command(command(42, "status")), Err(EnqueueError::Closed));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_without_start_closes_queue() {
        let (_chat, _publisher, service) = service();
        service.shutdown().await;
        assert_eq!(service.command(command(42, "status")), Err(EnqueueError::Closed));
        assert!(service.start(&ScriptedSubscriber::new(vec![]), "q").await.is_err());
    }
}
