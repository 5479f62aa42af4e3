//! Canonical event types exchanged over the message bus.
//!
//! Every envelope carries at least a `type` tag and a `source` address.
//! Tag-specific payloads are only decoded by the processors that need them.

use serde::{Deserialize, Serialize};

use crate::common::types::Player;

/// Event type tags.
pub mod tags {
    pub const CHAT: &str = "event:chat";
    pub const CHAT_TEAM: &str = "event:chat_team";
    pub const CHAT_WHISPER: &str = "event:chat_whisper";
    pub const VOTE_KICK_STARTED: &str = "event:vote_kick_started";
    pub const VOTE_SPEC_STARTED: &str = "event:vote_spec_started";
    pub const VOTE_OPTION_STARTED: &str = "event:vote_option_started";
    pub const MAP_CHANGED: &str = "event:map_changed";
    pub const PLAYER_JOINED: &str = "event:player_joined";
    pub const PLAYER_LEFT: &str = "event:player_left";
    pub const REQUEST_COMMAND_EXEC: &str = "request:command_exec";

    /// Tags the service queue subscribes to.
    pub const CONSUMED: &[&str] = &[
        CHAT,
        CHAT_TEAM,
        CHAT_WHISPER,
        VOTE_KICK_STARTED,
        VOTE_SPEC_STARTED,
        VOTE_OPTION_STARTED,
        MAP_CHANGED,
        PLAYER_JOINED,
        PLAYER_LEFT,
    ];
}

/// Header shared by every bus event.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseEvent {
    /// Empty when the publisher only set the message type header.
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(rename = "source", alias = "event_source")]
    pub source: String,
}

/// `event:chat`, `event:chat_team`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    pub player: Player,
    #[serde(default)]
    pub text: String,
}

/// `event:chat_whisper`.
#[derive(Debug, Clone, Deserialize)]
pub struct WhisperEvent {
    pub player: Player,
    pub target: Player,
    #[serde(default)]
    pub text: String,
}

/// `event:vote_kick_started`, `event:vote_spec_started`.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteTargetEvent {
    pub player: Player,
    pub target: Player,
    #[serde(default)]
    pub reason: String,
}

/// `event:vote_option_started`.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteOptionEvent {
    pub player: Player,
    #[serde(default)]
    pub option: String,
    #[serde(default)]
    pub reason: String,
}

/// `event:map_changed`.
#[derive(Debug, Clone, Deserialize)]
pub struct MapChangedEvent {
    pub old_map: String,
    pub new_map: String,
}

/// `event:player_joined`, `event:player_left`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerEvent {
    pub player: Player,
}

/// `request:command_exec`, addressed to a game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: String,
    pub source: String,
    pub requestor: String,
    pub command: String,
}

impl CommandExecRequest {
    pub fn new(
        timestamp: impl Into<String>,
        source: impl Into<String>,
        requestor: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            event_type: tags::REQUEST_COMMAND_EXEC.to_string(),
            timestamp: timestamp.into(),
            source: source.into(),
            requestor: requestor.into(),
            command: command.into(),
        }
    }
}

/// Wall-clock timestamp in the format used on the bus.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_event_accepts_source_alias() {
        let event: BaseEvent =
            serde_json::from_str(r#"{"type":"event:chat","event_source":"10.0.0.1:8303"}"#).unwrap();
        assert_eq!(event.event_type, tags::CHAT);
        assert_eq!(event.source, "10.0.0.1:8303");
    }

    #[test]
    fn test_base_event_requires_source() {
        assert!(serde_json::from_str::<BaseEvent>(r#"{"type":"event:chat"}"#).is_err());
        let untyped: BaseEvent = serde_json::from_str(r#"{"source":"10.0.0.1:8303"}"#).unwrap();
        assert!(untyped.event_type.is_empty());
    }

    #[test]
    fn test_command_exec_request_wire_shape() {
        let request = CommandExecRequest::new("2021-01-01 00:00:00", "discord", "discord", "status");
        let value: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "request:command_exec");
        assert_eq!(value["command"], "status");
        assert_eq!(value["source"], "discord");
    }
}
