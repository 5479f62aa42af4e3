//! Posts a readable line for every game event into the linked channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::common::messages::{
    tags, ChatEvent, MapChangedEvent, PlayerEvent, VoteOptionEvent, VoteTargetEvent, WhisperEvent,
};
use crate::common::types::{ChannelId, Player};
use crate::discord::markdown::{escape, flag, inline_code};
use crate::discord::ChatSink;
use crate::processors::{EventEnvelope, EventProcessor, ProcessorError};

type Formatter = fn(&[u8]) -> Result<String, serde_json::Error>;

/// Known tags and how to render their payload.
static FORMATTERS: &[(&str, Formatter)] = &[
    (tags::PLAYER_JOINED, format_player),
    (tags::PLAYER_LEFT, format_player),
    (tags::CHAT, format_chat),
    (tags::CHAT_TEAM, format_chat),
    (tags::CHAT_WHISPER, format_whisper),
    (tags::MAP_CHANGED, format_map_changed),
    (tags::VOTE_KICK_STARTED, format_kick_vote),
    (tags::VOTE_SPEC_STARTED, format_spec_vote),
    (tags::VOTE_OPTION_STARTED, format_option_vote),
];

/// Render an event for display.
///
/// Unknown tags pass the payload through untouched. A payload that does not
/// decode for a known tag renders as `[ERROR]: <cause>`.
pub fn format_event(event_type: &str, payload: &[u8]) -> String {
    let Some((_, formatter)) = FORMATTERS.iter().find(|(tag, _)| *tag == event_type) else {
        return String::from_utf8_lossy(payload).into_owned();
    };

    match formatter(payload) {
        Ok(body) => format!("{} {}", prefix(event_type), body),
        Err(e) => format!("[ERROR]: {}", e),
    }
}

/// `[joined]` for `event:player_joined`.
fn prefix(event_type: &str) -> String {
    match event_type.split_once(':') {
        Some((_, suffix)) => format!("[{}]", suffix.to_lowercase()),
        None => String::new(),
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(payload)
}

fn speaker(player: &Player) -> String {
    format!("{} ({})", inline_code(&player.name), player.id)
}

fn format_player(payload: &[u8]) -> Result<String, serde_json::Error> {
    let event: PlayerEvent = decode(payload)?;
    Ok(format!(
        "{} {} {}",
        flag(event.player.country),
        inline_code(&event.player.name),
        inline_code(&event.player.clan)
    ))
}

fn format_chat(payload: &[u8]) -> Result<String, serde_json::Error> {
    let event: ChatEvent = decode(payload)?;
    Ok(format!("{}: {}", speaker(&event.player), escape(&event.text)))
}

fn format_whisper(payload: &[u8]) -> Result<String, serde_json::Error> {
    let event: WhisperEvent = decode(payload)?;
    Ok(format!(
        "{} -> {}: {}",
        speaker(&event.player),
        speaker(&event.target),
        escape(&event.text)
    ))
}

fn format_map_changed(payload: &[u8]) -> Result<String, serde_json::Error> {
    let event: MapChangedEvent = decode(payload)?;
    Ok(format!(
        "from {} to {}",
        inline_code(&event.old_map),
        inline_code(&event.new_map)
    ))
}

fn format_target_vote(payload: &[u8], verb: &str) -> Result<String, serde_json::Error> {
    let event: VoteTargetEvent = decode(payload)?;
    Ok(format!(
        "{} {} {} with reason {}",
        speaker(&event.player),
        verb,
        speaker(&event.target),
        inline_code(&event.reason)
    ))
}

fn format_kick_vote(payload: &[u8]) -> Result<String, serde_json::Error> {
    format_target_vote(payload, "kickvotes")
}

fn format_spec_vote(payload: &[u8]) -> Result<String, serde_json::Error> {
    format_target_vote(payload, "specvotes")
}

fn format_option_vote(payload: &[u8]) -> Result<String, serde_json::Error> {
    let event: VoteOptionEvent = decode(payload)?;
    Ok(format!(
        "{} voted option {} with reason {}",
        speaker(&event.player),
        inline_code(&event.option),
        inline_code(&event.reason)
    ))
}

/// Chat-log processor.
pub struct DiscordLog {
    chat: Arc<dyn ChatSink>,
    skip_join_leave: bool,
    skip_whisper: bool,
}

impl DiscordLog {
    pub fn new(chat: Arc<dyn ChatSink>, skip_join_leave: bool, skip_whisper: bool) -> Self {
        Self {
            chat,
            skip_join_leave,
            skip_whisper,
        }
    }

    fn suppressed(&self, event_type: &str) -> bool {
        match event_type {
            tags::PLAYER_JOINED | tags::PLAYER_LEFT => self.skip_join_leave,
            tags::CHAT_WHISPER => self.skip_whisper,
            _ => false,
        }
    }
}

#[async_trait]
impl EventProcessor for DiscordLog {
    fn name(&self) -> &'static str {
        "discord-log"
    }

    async fn process(&self, channel: ChannelId, envelope: &EventEnvelope) -> Result<(), ProcessorError> {
        if self.suppressed(&envelope.event_type) {
            debug!("Suppressed {} from {}", envelope.event_type, envelope.source);
            return Ok(());
        }

        let text = format_event(&envelope.event_type, &envelope.payload);
        self.chat.send_message(channel, &text).await?;
        Ok(())
    }
}
