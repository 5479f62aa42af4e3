//! Address-channel link registry.
//!
//! Keeps the one-to-one mapping between game server addresses and Discord
//! channels. Both directions plus the serialized form live behind a single
//! lock so a link is either fully present or fully absent.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::common::error::{LinkError, LinkKey};
use crate::common::types::{ChannelId, ServerAddress};

#[derive(Debug, Default)]
struct Links {
    by_address: HashMap<ServerAddress, ChannelId>,
    by_channel: HashMap<ChannelId, ServerAddress>,
    /// address -> channel id as written to the links file.
    serialized: BTreeMap<String, String>,
}

impl Links {
    fn insert(&mut self, address: ServerAddress, channel: ChannelId) -> Result<(), LinkError> {
        if self.by_address.contains_key(&address) {
            return Err(LinkError::AlreadyLinked {
                key: LinkKey::Address(address),
            });
        }
        if self.by_channel.contains_key(&channel) {
            return Err(LinkError::AlreadyLinked {
                key: LinkKey::Channel(channel),
            });
        }

        self.serialized
            .insert(address.as_str().to_string(), channel.to_string());
        self.by_channel.insert(channel, address.clone());
        self.by_address.insert(address, channel);
        Ok(())
    }
}

/// Bidirectional, thread-safe address <-> channel mapping.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    links: RwLock<Links>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from seed links, failing on the first invalid or conflicting pair.
    pub fn from_links<'a, I>(links: I) -> Result<Self, LinkError>
    where
        I: IntoIterator<Item = (&'a str, ChannelId)>,
    {
        let mut seeded = Links::default();
        for (address, channel) in links {
            seeded.insert(ServerAddress::parse(address)?, channel)?;
        }
        Ok(Self {
            links: RwLock::new(seeded),
        })
    }

    /// Link `address` to `channel`. Fails if either side is already linked.
    pub fn add_link(&self, address: &str, channel: ChannelId) -> Result<(), LinkError> {
        let address = ServerAddress::parse(address)?;
        self.links.write().insert(address, channel)
    }

    /// Remove the link of `address`, returning the channel it pointed to.
    pub fn remove_by_address(&self, address: &str) -> Result<ChannelId, LinkError> {
        let address = ServerAddress::parse(address)?;

        let mut links = self.links.write();
        let channel = links
            .by_address
            .remove(&address)
            .ok_or_else(|| LinkError::NotFound {
                key: LinkKey::Address(address.clone()),
            })?;
        links.by_channel.remove(&channel);
        links.serialized.remove(address.as_str());
        Ok(channel)
    }

    /// Remove the link of `channel`, returning the address it pointed to.
    pub fn remove_by_channel(&self, channel: ChannelId) -> Result<ServerAddress, LinkError> {
        let mut links = self.links.write();
        let address = links
            .by_channel
            .remove(&channel)
            .ok_or(LinkError::NotFound {
                key: LinkKey::Channel(channel),
            })?;
        links.by_address.remove(&address);
        links.serialized.remove(address.as_str());
        Ok(address)
    }

    /// Channel linked to `address`.
    pub fn channel(&self, address: &str) -> Result<ChannelId, LinkError> {
        let address = ServerAddress::parse(address)?;
        let channel = self.links.read().by_address.get(&address).copied();
        channel.ok_or(LinkError::NotFound {
            key: LinkKey::Address(address),
        })
    }

    /// Address linked to `channel`.
    pub fn address(&self, channel: ChannelId) -> Result<ServerAddress, LinkError> {
        let address = self.links.read().by_channel.get(&channel).cloned();
        address.ok_or(LinkError::NotFound {
            key: LinkKey::Channel(channel),
        })
    }

    /// Serialized view: address -> channel id string, ordered by address.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.links.read().serialized.clone()
    }

    pub fn len(&self) -> usize {
        self.links.read().by_address.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
