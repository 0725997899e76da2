use tracing::{debug, info};

use super::channel::Channel;
use super::events::{CacheEvent, ChannelId, RoleId, ServerId, UserId};
use super::member::{Member, MemberKey};
use super::permissions::{Permissions, apply_channel_overwrites};
use super::registry::EntityRegistry;
use super::role::{Role, RoleKey};
use super::server::Server;
use super::update::{ChannelUpdate, Field, MemberUpdate, Merge, RoleUpdate, ServerUpdate};
use crate::error::{CacheError, CacheResult};

/// Behaviour switches for an [`EntityCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Construct the everyone role as soon as a server is first cached.
    pub create_everyone_role: bool,
    /// Construct a locked-zero role when a member references an unknown
    /// role id.
    pub lazy_roles: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            create_everyone_role: true,
            lazy_roles: true,
        }
    }
}

/// Entity counts, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub servers: usize,
    pub roles: usize,
    pub members: usize,
    pub channels: usize,
}

fn role_key(server_id: &str, role_id: &str) -> RoleKey {
    (server_id.to_string(), role_id.to_string())
}

fn member_key(server_id: &str, user_id: &str) -> MemberKey {
    (server_id.to_string(), user_id.to_string())
}

/// The client-side entity graph: servers and the roles, members and
/// channels indexed under them.
///
/// Not thread-safe by itself. Every mutation, including the permission
/// recomputation it triggers, completes before the call returns; share it
/// through [`super::dispatch::CacheHandle`] to keep a single writer.
#[derive(Debug)]
pub struct EntityCache {
    servers: EntityRegistry<ServerId, Server>,
    roles: EntityRegistry<RoleKey, Role>,
    members: EntityRegistry<MemberKey, Member>,
    channels: EntityRegistry<ChannelId, Channel>,
    options: CacheOptions,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl EntityCache {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            servers: EntityRegistry::new("server"),
            roles: EntityRegistry::new("role"),
            members: EntityRegistry::new("member"),
            channels: EntityRegistry::new("channel"),
            options,
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn server(&self, server_id: &str) -> Option<&Server> {
        self.servers.get(server_id)
    }

    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values()
    }

    pub fn role(&self, server_id: &str, role_id: &str) -> Option<&Role> {
        self.roles.get(&role_key(server_id, role_id))
    }

    pub fn member(&self, server_id: &str, user_id: &str) -> Option<&Member> {
        self.members.get(&member_key(server_id, user_id))
    }

    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.get(channel_id)
    }

    /// Roles of a server. Empty if the server is not cached.
    pub fn server_roles<'a>(&'a self, server_id: &'a str) -> impl Iterator<Item = &'a Role> + 'a {
        self.servers
            .get(server_id)
            .into_iter()
            .flat_map(|s| s.role_ids().iter())
            .filter_map(move |id| self.roles.get(&role_key(server_id, id)))
    }

    /// Members of a server. Empty if the server is not cached.
    pub fn server_members<'a>(
        &'a self,
        server_id: &'a str,
    ) -> impl Iterator<Item = &'a Member> + 'a {
        self.servers
            .get(server_id)
            .into_iter()
            .flat_map(|s| s.member_user_ids().iter())
            .filter_map(move |id| self.members.get(&member_key(server_id, id)))
    }

    pub fn server_channels<'a>(
        &'a self,
        server_id: &'a str,
    ) -> impl Iterator<Item = &'a Channel> + 'a {
        self.servers
            .get(server_id)
            .into_iter()
            .flat_map(|s| s.channel_ids().iter())
            .filter_map(move |id| self.channels.get(id.as_str()))
    }

    pub fn effective_permissions(&self, server_id: &str, user_id: &str) -> Option<Permissions> {
        self.member(server_id, user_id)
            .map(Member::effective_permissions)
    }

    /// A member's permissions in one channel: the server-level snapshot
    /// with the channel's overwrites applied. Computed on every call.
    pub fn channel_permissions(&self, user_id: &str, channel_id: &str) -> Option<Permissions> {
        let channel = self.channel(channel_id)?;
        let server_id = channel.server_id();
        let member = self.member(server_id, user_id)?;
        let is_owner = self
            .server(server_id)
            .and_then(Server::owner_id)
            .is_some_and(|owner| owner == user_id);
        let held: Vec<&str> = member.role_ids().iter().map(String::as_str).collect();

        Some(apply_channel_overwrites(
            member.effective_permissions(),
            &held,
            channel.overwrites(),
            server_id,
            user_id,
            is_owner,
        ))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            servers: self.servers.len(),
            roles: self.roles.len(),
            members: self.members.len(),
            channels: self.channels.len(),
        }
    }

    // ── Event dispatch ──────────────────────────────────────────────

    /// Apply one event. Events must be applied in delivery order.
    pub fn apply(&mut self, event: &CacheEvent) -> CacheResult<()> {
        match event {
            CacheEvent::ServerUpdate { server_id, update } => self.update_server(server_id, update),
            CacheEvent::ServerRemove { server_id } => {
                self.remove_server(server_id);
                Ok(())
            }
            CacheEvent::RoleUpdate {
                server_id,
                role_id,
                update,
            } => self.update_role(server_id, role_id, update),
            CacheEvent::RoleRemove { server_id, role_id } => {
                self.remove_role(server_id, role_id);
                Ok(())
            }
            CacheEvent::MemberUpdate {
                server_id,
                user_id,
                update,
            } => self.update_member(server_id, user_id, update),
            CacheEvent::MemberRemove { server_id, user_id } => {
                self.remove_member(server_id, user_id);
                Ok(())
            }
            CacheEvent::MemberRoleAdd {
                server_id,
                user_id,
                role_id,
            } => self.add_member_role(server_id, user_id, role_id).map(|_| ()),
            CacheEvent::MemberRoleRemove {
                server_id,
                user_id,
                role_id,
            } => self
                .remove_member_role(server_id, user_id, role_id)
                .map(|_| ()),
            CacheEvent::ChannelUpdate {
                server_id,
                channel_id,
                update,
            } => self.update_channel(server_id, channel_id, update),
            CacheEvent::ChannelRemove { channel_id } => {
                self.remove_channel(channel_id);
                Ok(())
            }
        }
    }

    // ── Servers ─────────────────────────────────────────────────────

    /// Cache a fully built server. Fails if the id is already cached.
    pub fn insert_server(&mut self, server: Server) -> CacheResult<()> {
        let server_id = server.id().to_string();
        self.servers.insert(server_id.clone(), server, &mut ())?;
        if self.options.create_everyone_role {
            self.ensure_role(&server_id, &server_id);
        }
        Ok(())
    }

    /// Merge a server payload, constructing the server on first sight.
    /// Embedded role and member lists are merged after the server's own
    /// fields.
    pub fn update_server(&mut self, server_id: &str, update: &ServerUpdate) -> CacheResult<()> {
        let created = !self.servers.contains(server_id);
        let server =
            self.servers
                .get_or_create(server_id.to_string(), || Server::new(server_id), &mut ());
        let previous_owner = server.owner_id().map(str::to_string);
        server.merge(update)?;
        let owner_changed = server.owner_id() != previous_owner.as_deref();

        if created {
            info!(%server_id, "server cached");
            if self.options.create_everyone_role {
                self.ensure_role(server_id, server_id);
            }
        }

        if let Field::Present(roles) = &update.roles {
            for entry in roles {
                self.update_role(server_id, &entry.id, &entry.update)?;
            }
        }
        if let Field::Present(members) = &update.members {
            for entry in members {
                self.update_member(server_id, &entry.user_id, &entry.update)?;
            }
        }

        if owner_changed && !created {
            self.refresh_server(server_id);
        }
        Ok(())
    }

    /// Evict a server together with its channels, members and roles.
    ///
    /// The server leaves first, so the children's uncached hooks find no
    /// server to unindex from.
    pub fn remove_server(&mut self, server_id: &str) -> Option<Server> {
        let server = self.servers.remove(server_id, &mut ())?;

        for channel_id in server.channel_ids() {
            self.channels.remove(channel_id.as_str(), &mut self.servers);
        }
        for user_id in server.member_user_ids() {
            self.members
                .remove(&member_key(server_id, user_id), &mut self.servers);
        }
        for role_id in server.role_ids() {
            self.roles
                .remove(&role_key(server_id, role_id), &mut self.servers);
        }

        info!(
            %server_id,
            roles = server.role_ids().len(),
            members = server.member_count(),
            channels = server.channel_ids().len(),
            "server evicted"
        );
        Some(server)
    }

    // ── Roles ───────────────────────────────────────────────────────

    /// Cache a fully built role and refresh the members holding it.
    pub fn insert_role(&mut self, role: Role) -> CacheResult<()> {
        let (server_id, role_id) = role.key();
        self.require_server(&server_id)?;
        self.roles
            .insert((server_id.clone(), role_id.clone()), role, &mut self.servers)?;
        self.refresh_role_holders(&server_id, &role_id);
        Ok(())
    }

    /// Merge a role payload, constructing the role on first sight, then
    /// recompute every member holding it before returning.
    pub fn update_role(
        &mut self,
        server_id: &str,
        role_id: &str,
        update: &RoleUpdate,
    ) -> CacheResult<()> {
        self.require_server(server_id)?;
        check_server("role", role_id, server_id, update.server_id.as_deref())?;

        let role = self.roles.get_or_create(
            role_key(server_id, role_id),
            || Role::new(server_id, role_id),
            &mut self.servers,
        );
        role.merge(update)?;

        self.refresh_role_holders(server_id, role_id);
        Ok(())
    }

    /// Evict a role. Members keep the id in their role set; their
    /// permissions are recomputed without it.
    pub fn remove_role(&mut self, server_id: &str, role_id: &str) -> Option<Role> {
        let role = self
            .roles
            .remove(&role_key(server_id, role_id), &mut self.servers)?;
        debug!(%server_id, %role_id, "role evicted");
        self.refresh_role_holders(server_id, role_id);
        Some(role)
    }

    /// Construct a locked-zero role if none is cached. Returns whether one
    /// was created.
    fn ensure_role(&mut self, server_id: &str, role_id: &str) -> bool {
        let key = role_key(server_id, role_id);
        if self.roles.contains(&key) {
            return false;
        }
        self.roles
            .get_or_create(key, || Role::new(server_id, role_id), &mut self.servers);
        debug!(%server_id, %role_id, "role constructed by reference");
        true
    }

    // ── Members ─────────────────────────────────────────────────────

    /// Cache a fully built member and compute its permissions.
    pub fn insert_member(&mut self, member: Member) -> CacheResult<()> {
        let (server_id, user_id) = member.key();
        self.require_server(&server_id)?;
        let role_ids: Vec<RoleId> = member.role_ids().iter().cloned().collect();
        self.members
            .insert((server_id.clone(), user_id.clone()), member, &mut self.servers)?;
        self.ensure_member_roles(&server_id, &role_ids);
        self.refresh_member(&server_id, &user_id);
        Ok(())
    }

    pub fn update_member(
        &mut self,
        server_id: &str,
        user_id: &str,
        update: &MemberUpdate,
    ) -> CacheResult<()> {
        self.require_server(server_id)?;
        check_server("member", user_id, server_id, update.server_id.as_deref())?;

        let member = self.members.get_or_create(
            member_key(server_id, user_id),
            || Member::new(server_id, user_id),
            &mut self.servers,
        );
        member.merge(update)?;

        if !update.roles.is_absent() {
            let role_ids: Vec<RoleId> = member.role_ids().iter().cloned().collect();
            self.ensure_member_roles(server_id, &role_ids);
        }
        self.refresh_member(server_id, user_id);
        Ok(())
    }

    pub fn remove_member(&mut self, server_id: &str, user_id: &str) -> Option<Member> {
        let member = self
            .members
            .remove(&member_key(server_id, user_id), &mut self.servers)?;
        debug!(%server_id, %user_id, "member evicted");
        Some(member)
    }

    /// Grant one role to a cached member. Returns false if the member is
    /// not cached or already held the role.
    pub fn add_member_role(
        &mut self,
        server_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> CacheResult<bool> {
        self.require_server(server_id)?;
        let Some(member) = self.members.get_mut(&member_key(server_id, user_id)) else {
            return Ok(false);
        };
        if !member.add_role(role_id) {
            return Ok(false);
        }
        self.ensure_member_roles(server_id, &[role_id.to_string()]);
        self.refresh_member(server_id, user_id);
        Ok(true)
    }

    /// Take one role from a cached member. Returns false if the member is
    /// not cached or did not hold the role.
    pub fn remove_member_role(
        &mut self,
        server_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> CacheResult<bool> {
        self.require_server(server_id)?;
        let Some(member) = self.members.get_mut(&member_key(server_id, user_id)) else {
            return Ok(false);
        };
        if !member.remove_role(role_id) {
            return Ok(false);
        }
        self.refresh_member(server_id, user_id);
        Ok(true)
    }

    fn ensure_member_roles(&mut self, server_id: &str, role_ids: &[RoleId]) {
        if !self.options.lazy_roles {
            return;
        }
        for role_id in role_ids {
            self.ensure_role(server_id, role_id);
        }
    }

    // ── Channels ────────────────────────────────────────────────────

    pub fn update_channel(
        &mut self,
        server_id: &str,
        channel_id: &str,
        update: &ChannelUpdate,
    ) -> CacheResult<()> {
        self.require_server(server_id)?;
        check_server("channel", channel_id, server_id, update.server_id.as_deref())?;
        if let Some(existing) = self.channels.get(channel_id) {
            check_server("channel", channel_id, existing.server_id(), Some(server_id))?;
        }

        let channel = self.channels.get_or_create(
            channel_id.to_string(),
            || Channel::new(server_id, channel_id),
            &mut self.servers,
        );
        channel.merge(update)
    }

    pub fn remove_channel(&mut self, channel_id: &str) -> Option<Channel> {
        let channel = self.channels.remove(channel_id, &mut self.servers)?;
        debug!(server_id = %channel.server_id(), %channel_id, "channel evicted");
        Some(channel)
    }

    // ── Permission recomputation ────────────────────────────────────

    fn require_server(&self, server_id: &str) -> CacheResult<()> {
        if self.servers.contains(server_id) {
            Ok(())
        } else {
            Err(CacheError::UnknownServer(server_id.to_string()))
        }
    }

    fn refresh_member(&mut self, server_id: &str, user_id: &str) {
        let Some(member) = self.members.get_mut(&member_key(server_id, user_id)) else {
            return;
        };
        member.update_permissions(self.servers.get(server_id), &self.roles);
    }

    /// Recompute every member holding `role_id`, or every member of the
    /// server for the everyone role.
    fn refresh_role_holders(&mut self, server_id: &str, role_id: &str) {
        let everyone = server_id == role_id;
        let holders: Vec<UserId> = self
            .server_members(server_id)
            .filter(|m| everyone || m.has_role(role_id))
            .map(|m| m.user_id().to_string())
            .collect();

        for user_id in &holders {
            self.refresh_member(server_id, user_id);
        }
        debug!(%server_id, %role_id, count = holders.len(), "role holders recomputed");
    }

    fn refresh_server(&mut self, server_id: &str) {
        self.refresh_role_holders(server_id, server_id);
    }
}

fn check_server(
    kind: &'static str,
    id: &str,
    expected: &str,
    found: Option<&str>,
) -> CacheResult<()> {
    match found {
        Some(found) if found != expected => Err(CacheError::ServerMismatch {
            kind,
            id: id.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        _ => Ok(()),
    }
}
