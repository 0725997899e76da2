use std::fmt;

use super::permissions::Permissions;
use crate::error::{CacheError, CacheResult};

/// Two-phase state of a value object. Only the merge path inside this crate
/// may write through a locked value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState<T> {
    Unlocked(T),
    Locked(T),
}

/// A value that can be set freely until it is locked, and is read-only to
/// callers afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lockable<T: Copy> {
    state: LockState<T>,
}

impl<T: Copy> Lockable<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: LockState::Unlocked(value),
        }
    }

    /// Construct already locked.
    pub fn locked(value: T) -> Self {
        Self {
            state: LockState::Locked(value),
        }
    }

    pub fn get(&self) -> T {
        match self.state {
            LockState::Unlocked(v) | LockState::Locked(v) => v,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, LockState::Locked(_))
    }

    /// Idempotent and irreversible.
    pub fn lock(&mut self) {
        self.state = LockState::Locked(self.get());
    }

    /// Fails with [`CacheError::Locked`] once the value has been locked.
    pub fn set(&mut self, value: T) -> CacheResult<()> {
        match self.state {
            LockState::Unlocked(_) => {
                self.state = LockState::Unlocked(value);
                Ok(())
            }
            LockState::Locked(_) => Err(CacheError::Locked),
        }
    }

    /// Writes through the lock, keeping the current phase.
    pub(crate) fn set_internal(&mut self, value: T) {
        self.state = match self.state {
            LockState::Unlocked(_) => LockState::Unlocked(value),
            LockState::Locked(_) => LockState::Locked(value),
        };
    }
}

/// RGB display color. The raw value is kept as received; only the low
/// 24 bits are read as channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color(u32);

impl Color {
    pub const DEFAULT: Color = Color(0);

    const RGB_MASK: u32 = 0x00ff_ffff;

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn blue(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0 & Self::RGB_MASK)
    }
}

/// A role's display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorValue {
    inner: Lockable<Color>,
}

impl ColorValue {
    pub fn new(raw: u32) -> Self {
        Self {
            inner: Lockable::new(Color::new(raw)),
        }
    }

    pub fn raw_value(&self) -> u32 {
        self.inner.get().raw()
    }

    pub fn color(&self) -> Color {
        self.inner.get()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn lock(&mut self) {
        self.inner.lock();
    }

    pub fn set_raw_value(&mut self, raw: u32) -> CacheResult<()> {
        self.inner.set(Color::new(raw))
    }

    pub(crate) fn set_raw_value_internal(&mut self, raw: u32) {
        self.inner.set_internal(Color::new(raw));
    }
}

/// A role's granted and denied capabilities.
///
/// `raw_value` is the grant set; the deny set is read through
/// `raw_deny_value`. Both halves share one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionValue {
    grants: Lockable<Permissions>,
    denies: Lockable<Permissions>,
}

impl PermissionValue {
    pub fn new(raw: u64) -> Self {
        Self {
            grants: Lockable::new(Permissions::from_bits_retain(raw)),
            denies: Lockable::new(Permissions::empty()),
        }
    }

    pub fn raw_value(&self) -> u64 {
        self.grants.get().bits()
    }

    pub fn raw_deny_value(&self) -> u64 {
        self.denies.get().bits()
    }

    pub fn grants(&self) -> Permissions {
        self.grants.get()
    }

    pub fn denies(&self) -> Permissions {
        self.denies.get()
    }

    pub fn is_locked(&self) -> bool {
        self.grants.is_locked()
    }

    pub fn lock(&mut self) {
        self.grants.lock();
        self.denies.lock();
    }

    pub fn set_raw_value(&mut self, raw: u64) -> CacheResult<()> {
        self.grants.set(Permissions::from_bits_retain(raw))
    }

    pub fn set_raw_deny_value(&mut self, raw: u64) -> CacheResult<()> {
        self.denies.set(Permissions::from_bits_retain(raw))
    }

    pub(crate) fn set_raw_value_internal(&mut self, raw: u64) {
        self.grants.set_internal(Permissions::from_bits_retain(raw));
    }

    pub(crate) fn set_raw_deny_value_internal(&mut self, raw: u64) {
        self.denies.set_internal(Permissions::from_bits_retain(raw));
    }
}
