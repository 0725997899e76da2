use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Capability bitfield for roles, channel overwrites and effective
    /// member permissions. Bits the remote sends that have no name here
    /// are kept as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u64 {
        // ── General ──
        const VIEW_CHANNELS         = 1 << 0;
        const MANAGE_CHANNELS       = 1 << 1;
        const MANAGE_ROLES          = 1 << 2;
        const MANAGE_SERVER         = 1 << 3;
        const CREATE_INVITES        = 1 << 4;
        const KICK_MEMBERS          = 1 << 5;
        const BAN_MEMBERS           = 1 << 6;
        const ADMINISTRATOR         = 1 << 7;

        // ── Channel text ──
        const SEND_MESSAGES         = 1 << 10;
        const EMBED_LINKS           = 1 << 11;
        const ATTACH_FILES          = 1 << 12;
        const ADD_REACTIONS         = 1 << 13;
        const MENTION_EVERYONE      = 1 << 14;
        const MANAGE_MESSAGES       = 1 << 15;
        const READ_MESSAGE_HISTORY  = 1 << 16;

        // ── Voice ──
        const CONNECT               = 1 << 20;
        const SPEAK                 = 1 << 21;
        const MUTE_MEMBERS          = 1 << 22;
        const DEAFEN_MEMBERS        = 1 << 23;
        const MOVE_MEMBERS          = 1 << 24;
    }
}

impl Permissions {
    /// Every named capability plus any unnamed bits.
    pub const fn everything() -> Self {
        Self::from_bits_retain(u64::MAX)
    }
}

/// One role's contribution to a member's permission fold.
#[derive(Debug, Clone, Copy)]
pub struct RoleGrant<'a> {
    pub id: &'a str,
    pub position: i32,
    pub grants: Permissions,
    pub denies: Permissions,
}

/// Fold a member's roles into a server-level permission set.
///
/// The everyone role is always applied first, whatever its position. The
/// remaining roles follow in ascending `(position, id)` order, each one
/// OR-ing in its grants and then clearing its denies, so a higher role's
/// explicit setting wins over a lower one.
///
/// Owners and holders of ADMINISTRATOR get every permission.
pub fn fold_role_permissions(
    everyone: Option<RoleGrant<'_>>,
    mut roles: Vec<RoleGrant<'_>>,
    is_owner: bool,
) -> Permissions {
    if is_owner {
        return Permissions::everything();
    }

    roles.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(b.id)));

    let mut perms = Permissions::empty();
    for role in everyone.iter().chain(&roles) {
        perms |= role.grants;
        perms &= !role.denies;
    }

    if perms.contains(Permissions::ADMINISTRATOR) {
        return Permissions::everything();
    }
    perms
}

/// A channel permission overwrite (allow/deny pair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub target_type: OverwriteTargetType,
    pub target_id: String,
    #[serde(with = "bits")]
    pub allow: Permissions,
    #[serde(with = "bits")]
    pub deny: Permissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteTargetType {
    Role,
    User,
}

/// Apply a channel's overwrites on top of a member's server-level
/// permissions.
///
/// Order:
///   1. Owners and ADMINISTRATOR holders keep every permission.
///   2. Apply the everyone-role overwrite (allow OR, deny AND NOT).
///   3. OR all of the member's role allows, AND NOT all role denies.
///   4. Apply the member's own overwrite.
pub fn apply_channel_overwrites(
    base: Permissions,
    held_role_ids: &[&str],
    overwrites: &[PermissionOverwrite],
    everyone_role_id: &str,
    user_id: &str,
    is_owner: bool,
) -> Permissions {
    if is_owner || base.contains(Permissions::ADMINISTRATOR) {
        return Permissions::everything();
    }

    let mut perms = base;
    if overwrites.is_empty() {
        return perms;
    }

    for ow in overwrites {
        if ow.target_type == OverwriteTargetType::Role && ow.target_id == everyone_role_id {
            perms |= ow.allow;
            perms &= !ow.deny;
        }
    }

    let mut role_allow = Permissions::empty();
    let mut role_deny = Permissions::empty();
    for ow in overwrites {
        if ow.target_type == OverwriteTargetType::Role
            && ow.target_id != everyone_role_id
            && held_role_ids.contains(&ow.target_id.as_str())
        {
            role_allow |= ow.allow;
            role_deny |= ow.deny;
        }
    }
    perms |= role_allow;
    perms &= !role_deny;

    for ow in overwrites {
        if ow.target_type == OverwriteTargetType::User && ow.target_id == user_id {
            perms |= ow.allow;
            perms &= !ow.deny;
        }
    }

    perms
}

/// Serialize permissions as their raw integer.
pub(crate) mod bits {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Permissions;

    pub fn serialize<S: Serializer>(perms: &Permissions, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(perms.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Permissions, D::Error> {
        u64::deserialize(d).map(Permissions::from_bits_retain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(id: &str, position: i32, grants: Permissions, denies: Permissions) -> RoleGrant<'_> {
        RoleGrant {
            id,
            position,
            grants,
            denies,
        }
    }

    #[test]
    fn test_bitfield_operations() {
        let perms = Permissions::VIEW_CHANNELS | Permissions::SEND_MESSAGES;
        assert!(perms.contains(Permissions::VIEW_CHANNELS));
        assert!(!perms.contains(Permissions::MANAGE_CHANNELS));

        let denied = perms & !Permissions::SEND_MESSAGES;
        assert!(!denied.contains(Permissions::SEND_MESSAGES));
        assert!(denied.contains(Permissions::VIEW_CHANNELS));
    }

    #[test]
    fn test_fold_everyone_only() {
        let perms = fold_role_permissions(
            Some(grant("s1", i32::MIN, Permissions::VIEW_CHANNELS, Permissions::empty())),
            vec![],
            false,
        );
        assert_eq!(perms, Permissions::VIEW_CHANNELS);
    }

    #[test]
    fn test_fold_everyone_first_even_against_min_position() {
        // "a" sorts before "s1" and shares its position, but still folds after it.
        let perms = fold_role_permissions(
            Some(grant("s1", i32::MIN, Permissions::empty(), Permissions::SEND_MESSAGES)),
            vec![grant("a", i32::MIN, Permissions::SEND_MESSAGES, Permissions::empty())],
            false,
        );
        assert!(perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_fold_higher_grant_beats_lower_deny() {
        let perms = fold_role_permissions(
            None,
            vec![
                grant("r2", 2, Permissions::SEND_MESSAGES, Permissions::empty()),
                grant("r1", 1, Permissions::empty(), Permissions::SEND_MESSAGES),
            ],
            false,
        );
        assert!(perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_fold_higher_deny_beats_lower_grant() {
        let perms = fold_role_permissions(
            None,
            vec![
                grant("r1", 1, Permissions::SEND_MESSAGES, Permissions::empty()),
                grant("r2", 2, Permissions::empty(), Permissions::SEND_MESSAGES),
            ],
            false,
        );
        assert!(!perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_fold_equal_position_ordered_by_id() {
        // "a" folds first, so "b"'s deny wins.
        let perms = fold_role_permissions(
            None,
            vec![
                grant("b", 5, Permissions::empty(), Permissions::KICK_MEMBERS),
                grant("a", 5, Permissions::KICK_MEMBERS, Permissions::empty()),
            ],
            false,
        );
        assert!(!perms.contains(Permissions::KICK_MEMBERS));
    }

    #[test]
    fn test_fold_grants_are_ored() {
        let perms = fold_role_permissions(
            None,
            vec![
                grant("r1", 1, Permissions::KICK_MEMBERS, Permissions::empty()),
                grant("r2", 2, Permissions::BAN_MEMBERS, Permissions::empty()),
            ],
            false,
        );
        assert!(perms.contains(Permissions::KICK_MEMBERS | Permissions::BAN_MEMBERS));
    }

    #[test]
    fn test_fold_administrator_expands() {
        let perms = fold_role_permissions(
            None,
            vec![grant("admin", 3, Permissions::ADMINISTRATOR, Permissions::empty())],
            false,
        );
        assert_eq!(perms, Permissions::everything());
    }

    #[test]
    fn test_fold_owner_bypass() {
        assert_eq!(fold_role_permissions(None, vec![], true), Permissions::everything());
    }

    #[test]
    fn test_fold_empty_is_empty() {
        assert_eq!(fold_role_permissions(None, vec![], false), Permissions::empty());
    }

    #[test]
    fn test_channel_everyone_deny() {
        let perms = apply_channel_overwrites(
            Permissions::VIEW_CHANNELS | Permissions::SEND_MESSAGES,
            &[],
            &[PermissionOverwrite {
                target_type: OverwriteTargetType::Role,
                target_id: "s1".to_string(),
                allow: Permissions::empty(),
                deny: Permissions::SEND_MESSAGES,
            }],
            "s1",
            "u1",
            false,
        );
        assert!(perms.contains(Permissions::VIEW_CHANNELS));
        assert!(!perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_channel_role_reallows_after_everyone_deny() {
        let perms = apply_channel_overwrites(
            Permissions::SEND_MESSAGES,
            &["mod"],
            &[
                PermissionOverwrite {
                    target_type: OverwriteTargetType::Role,
                    target_id: "s1".to_string(),
                    allow: Permissions::empty(),
                    deny: Permissions::SEND_MESSAGES,
                },
                PermissionOverwrite {
                    target_type: OverwriteTargetType::Role,
                    target_id: "mod".to_string(),
                    allow: Permissions::SEND_MESSAGES,
                    deny: Permissions::empty(),
                },
            ],
            "s1",
            "u1",
            false,
        );
        assert!(perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_channel_user_overwrite_applied_last() {
        let perms = apply_channel_overwrites(
            Permissions::SEND_MESSAGES,
            &["mod"],
            &[
                PermissionOverwrite {
                    target_type: OverwriteTargetType::Role,
                    target_id: "mod".to_string(),
                    allow: Permissions::MANAGE_MESSAGES,
                    deny: Permissions::empty(),
                },
                PermissionOverwrite {
                    target_type: OverwriteTargetType::User,
                    target_id: "u1".to_string(),
                    allow: Permissions::empty(),
                    deny: Permissions::MANAGE_MESSAGES | Permissions::SEND_MESSAGES,
                },
            ],
            "s1",
            "u1",
            false,
        );
        assert!(!perms.contains(Permissions::MANAGE_MESSAGES));
        assert!(!perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_channel_unrelated_overwrites_ignored() {
        let perms = apply_channel_overwrites(
            Permissions::SEND_MESSAGES,
            &[],
            &[
                PermissionOverwrite {
                    target_type: OverwriteTargetType::Role,
                    target_id: "other-role".to_string(),
                    allow: Permissions::empty(),
                    deny: Permissions::SEND_MESSAGES,
                },
                PermissionOverwrite {
                    target_type: OverwriteTargetType::User,
                    target_id: "other-user".to_string(),
                    allow: Permissions::empty(),
                    deny: Permissions::SEND_MESSAGES,
                },
            ],
            "s1",
            "u1",
            false,
        );
        assert!(perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_channel_administrator_ignores_overwrites() {
        let perms = apply_channel_overwrites(
            Permissions::ADMINISTRATOR,
            &[],
            &[PermissionOverwrite {
                target_type: OverwriteTargetType::User,
                target_id: "u1".to_string(),
                allow: Permissions::empty(),
                deny: Permissions::all(),
            }],
            "s1",
            "u1",
            false,
        );
        assert_eq!(perms, Permissions::everything());
    }

    #[test]
    fn test_overwrite_deserializes_raw_bits() {
        let ow: PermissionOverwrite = serde_json::from_str(
            r#"{"target_type":"role","target_id":"r1","allow":1024,"deny":1}"#,
        )
        .unwrap();
        assert_eq!(ow.target_type, OverwriteTargetType::Role);
        assert_eq!(ow.allow, Permissions::SEND_MESSAGES);
        assert_eq!(ow.deny, Permissions::VIEW_CHANNELS);
    }
}
