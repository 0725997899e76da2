use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::events::{ChannelId, RoleId, ServerId, UserId};
use super::registry::CacheHooks;
use super::update::{Merge, ServerUpdate};
use crate::error::CacheResult;

/// In-memory state for a server (guild).
///
/// Roles, members and channels live in the cache's registries; the server
/// keeps the index of which ids belong to it. Entities add and remove
/// themselves through their cache hooks.
#[derive(Debug, Clone)]
pub struct Server {
    id: ServerId,
    name: Option<String>,
    icon_url: Option<String>,
    owner_id: Option<UserId>,
    role_ids: BTreeSet<RoleId>,
    member_user_ids: BTreeSet<UserId>,
    channel_ids: BTreeSet<ChannelId>,
}

impl Server {
    pub fn new(id: impl Into<ServerId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            icon_url: None,
            owner_id: None,
            role_ids: BTreeSet::new(),
            member_user_ids: BTreeSet::new(),
            channel_ids: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn icon_url(&self) -> Option<&str> {
        self.icon_url.as_deref()
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    /// Id of the implicit everyone role.
    pub fn everyone_role_id(&self) -> &str {
        &self.id
    }

    pub fn role_ids(&self) -> &BTreeSet<RoleId> {
        &self.role_ids
    }

    pub fn member_user_ids(&self) -> &BTreeSet<UserId> {
        &self.member_user_ids
    }

    pub fn channel_ids(&self) -> &BTreeSet<ChannelId> {
        &self.channel_ids
    }

    pub fn member_count(&self) -> usize {
        self.member_user_ids.len()
    }

    pub(crate) fn set_owner(&mut self, user_id: impl Into<UserId>) {
        self.owner_id = Some(user_id.into());
    }

    pub(crate) fn add_role(&mut self, role_id: &str) {
        self.role_ids.insert(role_id.to_string());
    }

    pub(crate) fn remove_role(&mut self, role_id: &str) {
        self.role_ids.remove(role_id);
    }

    pub(crate) fn add_member(&mut self, user_id: &str) {
        self.member_user_ids.insert(user_id.to_string());
    }

    pub(crate) fn remove_member(&mut self, user_id: &str) {
        self.member_user_ids.remove(user_id);
    }

    pub(crate) fn add_channel(&mut self, channel_id: &str) {
        self.channel_ids.insert(channel_id.to_string());
    }

    pub(crate) fn remove_channel(&mut self, channel_id: &str) {
        self.channel_ids.remove(channel_id);
    }
}

/// Embedded role and member lists are merged by the cache, which owns the
/// registries they go into.
impl Merge<ServerUpdate> for Server {
    fn merge(&mut self, update: &ServerUpdate) -> CacheResult<()> {
        update.name.merge_some(&mut self.name);
        update.owner_id.merge_some(&mut self.owner_id);
        update.icon_url.merge_nullable(&mut self.icon_url);
        debug!(server_id = %self.id, name = ?self.name, "server merged");
        Ok(())
    }
}

impl CacheHooks<()> for Server {
    fn on_cached(&self, _: &mut ()) {
        trace!(server_id = %self.id, "server cached");
    }

    fn on_uncached(&self, _: &mut ()) {
        trace!(
            server_id = %self.id,
            roles = self.role_ids.len(),
            members = self.member_user_ids.len(),
            channels = self.channel_ids.len(),
            "server uncached"
        );
    }
}
