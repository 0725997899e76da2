use serde::Deserialize;
use tracing::{debug, trace};

use super::events::{ChannelId, ServerId};
use super::permissions::PermissionOverwrite;
use super::registry::{CacheHooks, EntityRegistry};
use super::server::Server;
use super::update::{ChannelUpdate, Merge};
use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Category,
}

/// In-memory state for a single channel.
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    server_id: ServerId,
    name: Option<String>,
    topic: Option<String>,
    position: i32,
    kind: ChannelKind,
    overwrites: Vec<PermissionOverwrite>,
}

impl Channel {
    pub fn new(server_id: impl Into<ServerId>, id: impl Into<ChannelId>) -> Self {
        Self {
            id: id.into(),
            server_id: server_id.into(),
            name: None,
            topic: None,
            position: 0,
            kind: ChannelKind::default(),
            overwrites: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn overwrites(&self) -> &[PermissionOverwrite] {
        &self.overwrites
    }
}

impl Merge<ChannelUpdate> for Channel {
    fn merge(&mut self, update: &ChannelUpdate) -> CacheResult<()> {
        if let Some(found) = &update.server_id
            && *found != self.server_id
        {
            return Err(CacheError::ServerMismatch {
                kind: "channel",
                id: self.id.clone(),
                expected: self.server_id.clone(),
                found: found.clone(),
            });
        }

        update.name.merge_some(&mut self.name);
        update.topic.merge_nullable(&mut self.topic);
        update.position.merge(&mut self.position);
        update.kind.merge(&mut self.kind);
        update.overwrites.merge(&mut self.overwrites);
        debug!(server_id = %self.server_id, channel_id = %self.id, "channel merged");
        Ok(())
    }
}

impl CacheHooks<EntityRegistry<ServerId, Server>> for Channel {
    fn on_cached(&self, servers: &mut EntityRegistry<ServerId, Server>) {
        match servers.get_mut(self.server_id.as_str()) {
            Some(server) => server.add_channel(&self.id),
            None => trace!(server_id = %self.server_id, channel_id = %self.id, "server gone, channel not indexed"),
        }
    }

    fn on_uncached(&self, servers: &mut EntityRegistry<ServerId, Server>) {
        if let Some(server) = servers.get_mut(self.server_id.as_str()) {
            server.remove_channel(&self.id);
        }
    }
}
