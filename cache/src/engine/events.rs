use serde::Deserialize;

use super::update::{ChannelUpdate, MemberUpdate, RoleUpdate, ServerUpdate};
use crate::error::CacheResult;

/// Identifier of a server, assigned by the remote platform.
pub type ServerId = String;

/// Identifier of a role, unique within its server.
pub type RoleId = String;

/// Identifier of a user.
pub type UserId = String;

/// Identifier of a channel.
pub type ChannelId = String;

/// An update or removal delivered by the transport layer, already decoded
/// from the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    ServerUpdate {
        server_id: ServerId,
        #[serde(default)]
        update: ServerUpdate,
    },

    ServerRemove {
        server_id: ServerId,
    },

    RoleUpdate {
        server_id: ServerId,
        role_id: RoleId,
        #[serde(default)]
        update: RoleUpdate,
    },

    RoleRemove {
        server_id: ServerId,
        role_id: RoleId,
    },

    MemberUpdate {
        server_id: ServerId,
        user_id: UserId,
        #[serde(default)]
        update: MemberUpdate,
    },

    MemberRemove {
        server_id: ServerId,
        user_id: UserId,
    },

    /// A single role was granted to a member.
    MemberRoleAdd {
        server_id: ServerId,
        user_id: UserId,
        role_id: RoleId,
    },

    /// A single role was taken from a member.
    MemberRoleRemove {
        server_id: ServerId,
        user_id: UserId,
        role_id: RoleId,
    },

    ChannelUpdate {
        server_id: ServerId,
        channel_id: ChannelId,
        #[serde(default)]
        update: ChannelUpdate,
    },

    ChannelRemove {
        channel_id: ChannelId,
    },
}

impl CacheEvent {
    /// Decode one JSON-encoded event.
    pub fn from_json(raw: &str) -> CacheResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServerUpdate { .. } => "server_update",
            Self::ServerRemove { .. } => "server_remove",
            Self::RoleUpdate { .. } => "role_update",
            Self::RoleRemove { .. } => "role_remove",
            Self::MemberUpdate { .. } => "member_update",
            Self::MemberRemove { .. } => "member_remove",
            Self::MemberRoleAdd { .. } => "member_role_add",
            Self::MemberRoleRemove { .. } => "member_role_remove",
            Self::ChannelUpdate { .. } => "channel_update",
            Self::ChannelRemove { .. } => "channel_remove",
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::ServerUpdate { server_id, .. }
            | Self::ServerRemove { server_id }
            | Self::RoleUpdate { server_id, .. }
            | Self::RoleRemove { server_id, .. }
            | Self::MemberUpdate { server_id, .. }
            | Self::MemberRemove { server_id, .. }
            | Self::MemberRoleAdd { server_id, .. }
            | Self::MemberRoleRemove { server_id, .. }
            | Self::ChannelUpdate { server_id, .. } => Some(server_id.as_str()),
            Self::ChannelRemove { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::update::Field;
    use crate::error::CacheError;

    #[test]
    fn test_role_update_event() {
        let event = CacheEvent::from_json(
            r#"{"type":"role_update","server_id":"s1","role_id":"r1","update":{"permissions":0}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "role_update");
        assert_eq!(event.server_id(), Some("s1"));
        let CacheEvent::RoleUpdate { update, .. } = event else {
            panic!("expected role update");
        };
        assert_eq!(update.permissions, Field::Present(0));
        assert!(update.name.is_absent());
    }

    #[test]
    fn test_update_body_defaults_to_empty() {
        let event =
            CacheEvent::from_json(r#"{"type":"member_update","server_id":"s1","user_id":"u1"}"#)
                .unwrap();
        let CacheEvent::MemberUpdate { update, .. } = event else {
            panic!("expected member update");
        };
        assert!(update.roles.is_absent());
    }

    #[test]
    fn test_server_update_with_embedded_lists() {
        let event = CacheEvent::from_json(
            r#"{"type":"server_update","server_id":"s1","update":{
                "name":"Rust","owner_id":"u0",
                "roles":[{"id":"s1","permissions":1},{"id":"r1","position":1}],
                "members":[{"user_id":"u1","roles":["r1"]}]
            }}"#,
        )
        .unwrap();
        let CacheEvent::ServerUpdate { update, .. } = event else {
            panic!("expected server update");
        };
        let Field::Present(roles) = update.roles else {
            panic!("roles missing");
        };
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[1].update.position, Field::Present(1));
        let Field::Present(members) = update.members else {
            panic!("members missing");
        };
        assert_eq!(members[0].user_id, "u1");
    }

    #[test]
    fn test_channel_remove_has_no_server() {
        let event = CacheEvent::from_json(r#"{"type":"channel_remove","channel_id":"c1"}"#).unwrap();
        assert_eq!(event.server_id(), None);
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let err = CacheEvent::from_json(r#"{"type":"presence_update"}"#).unwrap_err();
        assert!(matches!(err, CacheError::MalformedEvent(_)));
    }
}
