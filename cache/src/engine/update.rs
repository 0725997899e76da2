//! Partial update payloads and the merge protocol.
//!
//! Every payload field is independently absent, explicitly null, or
//! present. Absent fields never touch the target; null only clears fields
//! whose domain allows clearing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::channel::ChannelKind;
use super::permissions::PermissionOverwrite;
use crate::error::CacheResult;

/// One field of a partial update payload.
///
/// Use with `#[serde(default)]` so a missing key decodes as `Absent` and a
/// JSON `null` as `Null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Null,
    Present(T),
}

impl<T: Clone> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// Overwrite `target` when present. Null is ignored.
    pub fn merge(&self, target: &mut T) -> bool {
        match self {
            Field::Present(v) => {
                *target = v.clone();
                true
            }
            Field::Absent | Field::Null => false,
        }
    }

    /// Overwrite `target` when present, clear it on null.
    pub fn merge_nullable(&self, target: &mut Option<T>) -> bool {
        match self {
            Field::Present(v) => {
                *target = Some(v.clone());
                true
            }
            Field::Null => {
                *target = None;
                true
            }
            Field::Absent => false,
        }
    }

    /// Set `target` when present. Null is ignored, the value stays known.
    pub fn merge_some(&self, target: &mut Option<T>) -> bool {
        match self {
            Field::Present(v) => {
                *target = Some(v.clone());
                true
            }
            Field::Absent | Field::Null => false,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Present(value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(d)? {
            Some(v) => Field::Present(v),
            None => Field::Null,
        })
    }
}

/// Merge a partial payload into a cached entity.
pub trait Merge<U> {
    fn merge(&mut self, update: &U) -> CacheResult<()>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoleUpdate {
    /// Checked against the role's own server; never merged.
    pub server_id: Option<String>,
    pub name: Field<String>,
    pub hoist: Field<bool>,
    pub managed: Field<bool>,
    pub position: Field<i32>,
    pub color: Field<u32>,
    /// Granted capabilities, raw bits.
    pub permissions: Field<u64>,
    /// Denied capabilities, raw bits.
    pub deny: Field<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemberUpdate {
    pub server_id: Option<String>,
    pub nickname: Field<String>,
    pub joined_at: Field<DateTime<Utc>>,
    /// Replaces the held role set when present.
    pub roles: Field<Vec<String>>,
}

impl MemberUpdate {
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: Field::Present(roles.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelUpdate {
    pub server_id: Option<String>,
    pub name: Field<String>,
    pub topic: Field<String>,
    pub position: Field<i32>,
    pub kind: Field<ChannelKind>,
    pub overwrites: Field<Vec<PermissionOverwrite>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerUpdate {
    pub name: Field<String>,
    pub owner_id: Field<String>,
    pub icon_url: Field<String>,
    /// Embedded role list, merged entry by entry.
    pub roles: Field<Vec<RoleEntry>>,
    /// Embedded member list, merged entry by entry.
    pub members: Field<Vec<MemberEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleEntry {
    pub id: String,
    #[serde(flatten)]
    pub update: RoleUpdate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberEntry {
    pub user_id: String,
    #[serde(flatten)]
    pub update: MemberUpdate,
}
