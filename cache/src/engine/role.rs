use tracing::{debug, trace};

use super::entity_cache::EntityCache;
use super::events::{RoleId, ServerId};
use super::member::Member;
use super::permissions::RoleGrant;
use super::registry::{CacheHooks, EntityRegistry};
use super::server::Server;
use super::update::{Field, Merge, RoleUpdate};
use super::value::{ColorValue, PermissionValue};
use crate::error::{CacheError, CacheResult};

/// A role within one server. Keyed by `(server_id, role_id)`.
pub type RoleKey = (ServerId, RoleId);

/// A named permission grant scoped to one server.
///
/// The server is resolved by id through the cache on every lookup; a role
/// never holds a reference to it.
#[derive(Debug, Clone)]
pub struct Role {
    id: RoleId,
    server_id: ServerId,
    name: Option<String>,
    hoisted: bool,
    managed: bool,
    position: i32,
    color: ColorValue,
    permissions: PermissionValue,
}

impl Role {
    /// A role nothing is known about yet: zero color and permissions,
    /// both locked. The everyone role is pinned to `i32::MIN`.
    pub fn new(server_id: impl Into<ServerId>, id: impl Into<RoleId>) -> Self {
        let server_id = server_id.into();
        let id = id.into();
        let position = if id == server_id { i32::MIN } else { 0 };

        let mut permissions = PermissionValue::new(0);
        permissions.lock();
        let mut color = ColorValue::new(0);
        color.lock();

        Self {
            id,
            server_id,
            name: None,
            hoisted: false,
            managed: false,
            position,
            color,
            permissions,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn key(&self) -> RoleKey {
        (self.server_id.clone(), self.id.clone())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_hoisted(&self) -> bool {
        self.hoisted
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn color(&self) -> &ColorValue {
        &self.color
    }

    pub fn permissions(&self) -> &PermissionValue {
        &self.permissions
    }

    /// The implicit role every member of the server holds.
    pub fn is_everyone(&self) -> bool {
        self.id == self.server_id
    }

    pub fn grant(&self) -> RoleGrant<'_> {
        RoleGrant {
            id: &self.id,
            position: self.position,
            grants: self.permissions.grants(),
            denies: self.permissions.denies(),
        }
    }

    /// Members currently holding this role, recomputed on every call.
    pub fn members<'a>(&'a self, cache: &'a EntityCache) -> impl Iterator<Item = &'a Member> + 'a {
        let everyone = self.is_everyone();
        cache
            .server_members(&self.server_id)
            .filter(move |m| everyone || m.has_role(&self.id))
    }

    pub fn member_ids<'a>(&'a self, cache: &'a EntityCache) -> impl Iterator<Item = &'a str> + 'a {
        self.members(cache).map(Member::user_id)
    }
}

impl Merge<RoleUpdate> for Role {
    fn merge(&mut self, update: &RoleUpdate) -> CacheResult<()> {
        if let Some(found) = &update.server_id
            && *found != self.server_id
        {
            return Err(CacheError::ServerMismatch {
                kind: "role",
                id: self.id.clone(),
                expected: self.server_id.clone(),
                found: found.clone(),
            });
        }

        update.name.merge_nullable(&mut self.name);
        update.hoist.merge(&mut self.hoisted);
        update.managed.merge(&mut self.managed);
        if !self.is_everyone() {
            update.position.merge(&mut self.position);
        }
        if let Field::Present(raw) = update.color {
            self.color.set_raw_value_internal(raw);
        }
        if let Field::Present(raw) = update.permissions {
            self.permissions.set_raw_value_internal(raw);
        }
        if let Field::Present(raw) = update.deny {
            self.permissions.set_raw_deny_value_internal(raw);
        }

        debug!(
            server_id = %self.server_id,
            role_id = %self.id,
            position = self.position,
            permissions = self.permissions.raw_value(),
            "role merged"
        );
        Ok(())
    }
}

impl CacheHooks<EntityRegistry<ServerId, Server>> for Role {
    fn on_cached(&self, servers: &mut EntityRegistry<ServerId, Server>) {
        match servers.get_mut(self.server_id.as_str()) {
            Some(server) => server.add_role(&self.id),
            None => trace!(server_id = %self.server_id, role_id = %self.id, "server gone, role not indexed"),
        }
    }

    fn on_uncached(&self, servers: &mut EntityRegistry<ServerId, Server>) {
        match servers.get_mut(self.server_id.as_str()) {
            Some(server) => server.remove_role(&self.id),
            None => trace!(server_id = %self.server_id, role_id = %self.id, "server gone, nothing to unindex"),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or(&self.id))
    }
}
