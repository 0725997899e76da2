use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::warn;

use crate::error::{CacheError, CacheResult};

/// Callbacks fired when an entity enters or leaves a registry.
///
/// `Ctx` is whatever the entity needs to maintain its back-references,
/// usually the server registry it indexes itself into. Hooks must tolerate
/// the target already being gone.
pub trait CacheHooks<Ctx> {
    fn on_cached(&self, ctx: &mut Ctx);
    fn on_uncached(&self, ctx: &mut Ctx);
}

/// Keyed store for one kind of cached entity.
///
/// Re-inserting a key that is already present is rejected with
/// [`CacheError::DuplicateEntity`]; the cached entry is left untouched and
/// no hook fires.
#[derive(Debug)]
pub struct EntityRegistry<K, V> {
    kind: &'static str,
    entries: HashMap<K, V>,
}

impl<K, V> EntityRegistry<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    /// Insert a new entity and fire its `on_cached` hook.
    pub fn insert<Ctx>(&mut self, key: K, value: V, ctx: &mut Ctx) -> CacheResult<&mut V>
    where
        V: CacheHooks<Ctx>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(e) => {
                warn!(kind = self.kind, key = ?e.key(), "rejected duplicate insertion");
                Err(CacheError::DuplicateEntity {
                    kind: self.kind,
                    key: format!("{:?}", e.key()),
                })
            }
            Entry::Vacant(e) => {
                let value = e.insert(value);
                value.on_cached(ctx);
                Ok(value)
            }
        }
    }

    /// Look up an entity, constructing and caching it on a miss. The
    /// factory runs at most once per key.
    pub fn get_or_create<Ctx, F>(&mut self, key: K, factory: F, ctx: &mut Ctx) -> &mut V
    where
        V: CacheHooks<Ctx>,
        F: FnOnce() -> V,
    {
        match self.entries.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let value = e.insert(factory());
                value.on_cached(ctx);
                value
            }
        }
    }

    /// Remove an entity, firing its `on_uncached` hook once.
    pub fn remove<Q, Ctx>(&mut self, key: &Q, ctx: &mut Ctx) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: CacheHooks<Ctx>,
    {
        let value = self.entries.remove(key)?;
        value.on_uncached(ctx);
        Some(value)
    }
}
