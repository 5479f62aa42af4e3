//! Chat messages from linked channels, forwarded to game servers as commands.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::bridge::registry::LinkRegistry;
use crate::bridge::shutdown;
use crate::bus::{BusPublisher, Destination};
use crate::common::error::{BusError, LinkError};
use crate::common::messages::{timestamp_now, CommandExecRequest};
use crate::common::types::{ChannelId, MessageId};
use crate::discord::ChatSink;

/// Capacity of the command queue between the gateway handler and the loop.
pub const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Requestor and source recorded on forwarded chat commands.
pub const REQUESTOR: &str = "discord-moderation";

const TRIM: &[char] = &[' ', '\n', '\r', '\t'];

/// A raw chat message awaiting routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    pub channel: ChannelId,
    pub message_id: MessageId,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Link(#[from] LinkError),

    #[error("{0}")]
    Bus(#[from] BusError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("command queue is full")]
    Full,

    #[error("command queue is closed")]
    Closed,
}

/// How a routed command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Published(Destination),
    Empty,
}

pub struct CommandRouter {
    registry: Arc<LinkRegistry>,
    publisher: Arc<dyn BusPublisher>,
}

impl CommandRouter {
    pub fn new(registry: Arc<LinkRegistry>, publisher: Arc<dyn BusPublisher>) -> Self {
        Self { registry, publisher }
    }

    /// Publish `command` to the server linked with its channel.
    pub async fn route(&self, command: &ChatCommand) -> Result<Routed, CommandError> {
        let address = self.registry.address(command.channel)?;

        let text = command.content.trim_matches(TRIM);
        if text.is_empty() {
            debug!(channel = command.channel, "Ignoring empty command");
            return Ok(Routed::Empty);
        }

        info!(channel = command.channel, address = %address, "Forwarding command: {}", text);
        let request = CommandExecRequest::new(timestamp_now(), REQUESTOR, REQUESTOR, text);
        let destination = Destination::Server(address);
        self.publisher
            .publish_to(&destination, serde_json::to_vec(&request).map_err(BusError::from)?)
            .await?;

        Ok(Routed::Published(destination))
    }
}

/// Cloneable, non-blocking sender side of the command queue.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::Sender<ChatCommand>,
}

impl CommandQueue {
    pub fn new() -> (Self, mpsc::Receiver<ChatCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, command: ChatCommand) -> Result<(), EnqueueError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

async fn handle(router: &CommandRouter, chat: &dyn ChatSink, command: ChatCommand) {
    if let Err(e) = router.route(&command).await {
        warn!(channel = command.channel, "Command rejected: {}", e);
        if let Err(send_error) = chat
            .send_reply(command.channel, &e.to_string(), command.message_id)
            .await
        {
            error!(channel = command.channel, "Failed to reply: {}", send_error);
        }
    }
}

/// Route queued commands until shutdown, then drain what was already queued.
pub async fn run_command_loop(
    router: Arc<CommandRouter>,
    chat: Arc<dyn ChatSink>,
    mut commands: mpsc::Receiver<ChatCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Command loop started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown::wait_for(&mut shutdown_rx) => {
                info!("Command loop received shutdown signal");
                break;
            }
            command = commands.recv() => match command {
                Some(command) => handle(&router, chat.as_ref(), command).await,
                None => {
                    info!("Command queue closed");
                    return;
                }
            },
        }
    }

    commands.close();
    let mut drained = 0;
    while let Some(command) = commands.recv().await {
        handle(&router, chat.as_ref(), command).await;
        drained += 1;
    }
    info!("Command loop stopped after draining {} commands", drained);
}
