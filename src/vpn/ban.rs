//! Ban command rendering and publication.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::bus::{BusPublisher, Destination};
use crate::common::error::BusError;
use crate::common::messages::{timestamp_now, CommandExecRequest};
use crate::common::types::{Player, ServerAddress};

/// Requestor and source recorded on every ban request.
pub const REQUESTOR: &str = "detect-vpn";

const TOKEN_IP: &str = "{IP}";
const TOKEN_ID: &str = "{ID}";
const TOKEN_MINUTES: &str = "{DURATION:MINUTES}";
const TOKEN_SECONDS: &str = "{DURATION:SECONDS}";
const TOKEN_REASON: &str = "{REASON}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanPolicy {
    /// Command template, e.g. `ban {IP} {DURATION:MINUTES} {REASON}`.
    pub command: String,
    pub duration: Duration,
    /// Send bans to every server instead of the one the player joined.
    pub broadcast: bool,
}

/// A rendered ban ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRequest {
    pub destination: Destination,
    pub event: CommandExecRequest,
}

impl BanPolicy {
    /// Substitute the template tokens for `player` in one left-to-right pass.
    ///
    /// Substituted values are never rescanned, so a reason containing `{IP}`
    /// is emitted literally.
    pub fn render(&self, player: &Player, reason: &str) -> String {
        let substitutions = [
            (TOKEN_IP, player.ip.clone()),
            (TOKEN_ID, player.id.to_string()),
            (TOKEN_MINUTES, (self.duration.as_secs() / 60).to_string()),
            (TOKEN_SECONDS, self.duration.as_secs().to_string()),
            (TOKEN_REASON, reason.to_string()),
        ];

        let mut rendered = String::with_capacity(self.command.len());
        let mut rest = self.command.as_str();
        'scan: while let Some(ch) = rest.chars().next() {
            if ch == '{' {
                for (token, value) in &substitutions {
                    if let Some(tail) = rest.strip_prefix(token) {
                        rendered.push_str(value);
                        rest = tail;
                        continue 'scan;
                    }
                }
            }
            rendered.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
        rendered
    }

    /// Where a ban for a player on `source` is sent.
    ///
    /// Player ids are only meaningful on their own server, so a template
    /// using `{ID}` is never broadcast.
    pub fn destination(&self, source: &ServerAddress) -> Destination {
        if self.broadcast && !self.command.contains(TOKEN_ID) {
            Destination::Broadcast
        } else {
            Destination::Server(source.clone())
        }
    }

    pub fn request(&self, player: &Player, reason: &str, source: &ServerAddress) -> BanRequest {
        BanRequest {
            destination: self.destination(source),
            event: CommandExecRequest::new(timestamp_now(), REQUESTOR, REQUESTOR, self.render(player, reason)),
        }
    }
}

/// Publishes ban requests built from a [`BanPolicy`].
pub struct BanRequester {
    policy: BanPolicy,
    publisher: Arc<dyn BusPublisher>,
}

impl BanRequester {
    pub fn new(policy: BanPolicy, publisher: Arc<dyn BusPublisher>) -> Self {
        Self { policy, publisher }
    }

    /// Publish one ban for `player`, returning where it was sent.
    pub async fn request_ban(
        &self,
        player: &Player,
        reason: &str,
        source: &ServerAddress,
    ) -> Result<Destination, BusError> {
        let request = self.policy.request(player, reason, source);
        let body = serde_json::to_vec(&request.event)?;
        self.publisher.publish_to(&request.destination, body).await?;

        info!(
            address = %source,
            ip = %player.ip,
            "Requested ban: {}",
            request.event.command
        );
        Ok(request.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::testing::RecordingPublisher;

    fn policy(command: &str, broadcast: bool) -> BanPolicy {
        BanPolicy {
            command: command.to_string(),
            duration: Duration::from_secs(24 * 60 * 60),
            broadcast,
        }
    }

    fn player() -> Player {
        Player {
            id: 3,
            name: "nameless tee".to_string(),
            ip: "1.2.3.4".to_string(),
            ..Player::default()
        }
    }

    fn source() -> ServerAddress {
        ServerAddress::parse("10.0.0.1:8303").unwrap()
    }

    #[test]
    fn test_render_all_tokens() {
        let policy = policy("ban {IP} {DURATION:MINUTES} {REASON} id={ID} s={DURATION:SECONDS}", false);
        assert_eq!(
            policy.render(&player(), "VPN"),
            "ban 1.2.3.4 1440 VPN id=3 s=86400"
        );
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let policy = policy("ban {IP} {REASON}", false);
        assert_eq!(policy.render(&player(), "{IP}"), "ban 1.2.3.4 {IP}");
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        let policy = policy("{x} ban {IP} {", false);
        assert_eq!(policy.render(&player(), "r"), "{x} ban 1.2.3.4 {");
    }

    #[tokio::test]
    async fn test_broadcast_without_id_token() {
        let publisher = RecordingPublisher::new();
        let requester = BanRequester::new(policy("ban {IP} {DURATION:MINUTES} {REASON}", true), publisher.clone());

        let destination = requester.request_ban(&player(), "VPN", &source()).await.unwrap();
        assert_eq!(destination, Destination::Broadcast);

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "broadcast");
        assert_eq!(published[0].body["command"], "ban 1.2.3.4 1440 VPN");
        assert_eq!(published[0].body["requestor"], REQUESTOR);
        assert_eq!(published[0].body["source"], REQUESTOR);
        assert_eq!(published[0].body["type"], "request:command_exec");
    }

    #[tokio::test]
    async fn test_id_token_always_targets_source() {
        for broadcast in [true, false] {
            let publisher = RecordingPublisher::new();
            let requester = BanRequester::new(policy("ban_id {ID} {DURATION:MINUTES}", broadcast), publisher.clone());

            let destination = requester.request_ban(&player(), "VPN", &source()).await.unwrap();
            assert_eq!(destination, Destination::Server(source()));

            let published = publisher.take();
            assert_eq!(published.len(), 1);
            assert_eq!(published[0].exchange, "");
            assert_eq!(published[0].routing_key, "10.0.0.1:8303");
        }
    }

    #[test]
    fn test_broadcast_off_targets_source() {
        let policy = policy("ban {IP}", false);
        assert_eq!(policy.destination(&source()), Destination::Server(source()));
    }
}
