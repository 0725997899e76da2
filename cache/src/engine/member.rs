use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::trace;

use super::events::{RoleId, ServerId, UserId};
use super::permissions::{Permissions, fold_role_permissions};
use super::registry::{CacheHooks, EntityRegistry};
use super::role::{Role, RoleKey};
use super::server::Server;
use super::update::{Field, MemberUpdate, Merge};
use super::value::Lockable;
use crate::error::{CacheError, CacheResult};

/// A member is identified by `(server_id, user_id)`.
pub type MemberKey = (ServerId, UserId);

/// A user's membership in one server.
#[derive(Debug, Clone)]
pub struct Member {
    server_id: ServerId,
    user_id: UserId,
    nickname: Option<String>,
    joined_at: Option<DateTime<Utc>>,
    role_ids: BTreeSet<RoleId>,
    /// Published snapshot; only recomputation writes it.
    permissions: Lockable<Permissions>,
}

impl Member {
    pub fn new(server_id: impl Into<ServerId>, user_id: impl Into<UserId>) -> Self {
        Self {
            server_id: server_id.into(),
            user_id: user_id.into(),
            nickname: None,
            joined_at: None,
            role_ids: BTreeSet::new(),
            permissions: Lockable::locked(Permissions::empty()),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn key(&self) -> MemberKey {
        (self.server_id.clone(), self.user_id.clone())
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn joined_at(&self) -> Option<DateTime<Utc>> {
        self.joined_at
    }

    /// Explicitly held roles. The everyone role is implied, not listed.
    pub fn role_ids(&self) -> &BTreeSet<RoleId> {
        &self.role_ids
    }

    pub fn has_role(&self, role_id: &str) -> bool {
        self.role_ids.contains(role_id)
    }

    pub fn effective_permissions(&self) -> Permissions {
        self.permissions.get()
    }

    pub(crate) fn add_role(&mut self, role_id: &str) -> bool {
        self.role_ids.insert(role_id.to_string())
    }

    pub(crate) fn remove_role(&mut self, role_id: &str) -> bool {
        self.role_ids.remove(role_id)
    }

    /// Recompute the effective permission snapshot from current cache
    /// state. Role ids with no cached role are skipped.
    pub fn update_permissions(
        &mut self,
        server: Option<&Server>,
        roles: &EntityRegistry<RoleKey, Role>,
    ) {
        let is_owner = server
            .and_then(Server::owner_id)
            .is_some_and(|owner| owner == self.user_id);

        let everyone = roles
            .get(&(self.server_id.clone(), self.server_id.clone()))
            .map(Role::grant);
        let held = self
            .role_ids
            .iter()
            .filter(|id| **id != self.server_id)
            .filter_map(|id| roles.get(&(self.server_id.clone(), id.clone())))
            .map(Role::grant)
            .collect();

        let perms = fold_role_permissions(everyone, held, is_owner);

        trace!(
            server_id = %self.server_id,
            user_id = %self.user_id,
            permissions = perms.bits(),
            "member permissions recomputed"
        );
        self.permissions.set_internal(perms);
    }
}

impl Merge<MemberUpdate> for Member {
    fn merge(&mut self, update: &MemberUpdate) -> CacheResult<()> {
        if let Some(found) = &update.server_id
            && *found != self.server_id
        {
            return Err(CacheError::ServerMismatch {
                kind: "member",
                id: self.user_id.clone(),
                expected: self.server_id.clone(),
                found: found.clone(),
            });
        }

        update.nickname.merge_nullable(&mut self.nickname);
        update.joined_at.merge_some(&mut self.joined_at);
        if let Field::Present(roles) = &update.roles {
            self.role_ids = roles.iter().cloned().collect();
        }
        Ok(())
    }
}

impl CacheHooks<EntityRegistry<ServerId, Server>> for Member {
    fn on_cached(&self, servers: &mut EntityRegistry<ServerId, Server>) {
        match servers.get_mut(self.server_id.as_str()) {
            Some(server) => server.add_member(&self.user_id),
            None => trace!(server_id = %self.server_id, user_id = %self.user_id, "server gone, member not indexed"),
        }
    }

    fn on_uncached(&self, servers: &mut EntityRegistry<ServerId, Server>) {
        if let Some(server) = servers.get_mut(self.server_id.as_str()) {
            server.remove_member(&self.user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::update::RoleUpdate;

    fn roles_with(entries: &[(&str, i32, Permissions, Permissions)]) -> EntityRegistry<RoleKey, Role> {
        let mut servers: EntityRegistry<ServerId, Server> = EntityRegistry::new("server");
        let mut roles = EntityRegistry::new("role");
        for (id, position, grants, denies) in entries {
            let mut role = Role::new("s1", *id);
            role.merge(&RoleUpdate {
                position: Field::Present(*position),
                permissions: Field::Present(grants.bits()),
                deny: Field::Present(denies.bits()),
                ..RoleUpdate::default()
            })
            .unwrap();
            roles
                .insert(("s1".to_string(), id.to_string()), role, &mut servers)
                .unwrap();
        }
        roles
    }

    #[test]
    fn test_new_member_has_no_permissions() {
        let member = Member::new("s1", "u1");
        assert_eq!(member.effective_permissions(), Permissions::empty());
        assert!(member.role_ids().is_empty());
    }

    #[test]
    fn test_everyone_role_applies_without_listing() {
        let roles = roles_with(&[("s1", 0, Permissions::VIEW_CHANNELS, Permissions::empty())]);
        let mut member = Member::new("s1", "u1");
        member.update_permissions(None, &roles);
        assert_eq!(member.effective_permissions(), Permissions::VIEW_CHANNELS);
    }

    #[test]
    fn test_higher_position_wins() {
        let roles = roles_with(&[
            ("r1", 1, Permissions::empty(), Permissions::SEND_MESSAGES),
            ("r2", 2, Permissions::SEND_MESSAGES, Permissions::empty()),
        ]);
        let mut member = Member::new("s1", "u1");
        member.merge(&MemberUpdate::with_roles(["r1", "r2"])).unwrap();
        member.update_permissions(None, &roles);
        assert!(member.effective_permissions().contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_dangling_role_is_skipped() {
        let roles = roles_with(&[("r1", 1, Permissions::KICK_MEMBERS, Permissions::empty())]);
        let mut member = Member::new("s1", "u1");
        member.merge(&MemberUpdate::with_roles(["r1", "deleted"])).unwrap();
        member.update_permissions(None, &roles);
        assert_eq!(member.effective_permissions(), Permissions::KICK_MEMBERS);
    }

    #[test]
    fn test_owner_gets_everything() {
        let roles = roles_with(&[]);
        let mut server = Server::new("s1");
        server.set_owner("u1");
        let mut member = Member::new("s1", "u1");
        member.update_permissions(Some(&server), &roles);
        assert_eq!(member.effective_permissions(), Permissions::everything());
    }

    #[test]
    fn test_role_list_replaces_and_dedups() {
        let mut member = Member::new("s1", "u1");
        member.merge(&MemberUpdate::with_roles(["a", "b", "a"])).unwrap();
        assert_eq!(member.role_ids().len(), 2);
        member.merge(&MemberUpdate::with_roles(["c"])).unwrap();
        assert!(member.has_role("c"));
        assert!(!member.has_role("a"));
    }

    #[test]
    fn test_absent_roles_leave_set_alone() {
        let mut member = Member::new("s1", "u1");
        member.merge(&MemberUpdate::with_roles(["a"])).unwrap();
        member
            .merge(&MemberUpdate {
                nickname: Field::Present("ally".into()),
                ..MemberUpdate::default()
            })
            .unwrap();
        assert!(member.has_role("a"));
        assert_eq!(member.nickname(), Some("ally"));
    }

    #[test]
    fn test_merge_rejects_other_server() {
        let mut member = Member::new("s1", "u1");
        let update = MemberUpdate {
            server_id: Some("s9".into()),
            ..MemberUpdate::with_roles(["a"])
        };
        assert!(member.merge(&update).is_err());
        assert!(member.role_ids().is_empty());
    }
}
