//! Identity cache: at most one live instance per (resource, key).

use crate::config::ResourceMap;
use crate::entity::{Entity, WeakRecord};
use crate::value::KeyValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps keys to live instances through weak handles; the cache never keeps an
/// instance alive on its own. Owned by one engine at a time.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<String, HashMap<KeyValue, WeakRecord>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live instance for `key`, or a new one holding only the key, registered before return.
    pub fn find(&mut self, map: &Arc<ResourceMap>, key: &KeyValue) -> Entity {
        let slot = self
            .entries
            .entry(map.name.clone())
            .or_default()
            .entry(key.clone())
            .or_default();
        if let Some(live) = Entity::upgrade(slot) {
            return live;
        }
        let entity = Entity::with_key(Arc::clone(map), key);
        *slot = entity.downgrade();
        entity
    }

    pub fn get(&self, resource: &str, key: &KeyValue) -> Option<Entity> {
        self.entries.get(resource)?.get(key).and_then(Entity::upgrade)
    }

    /// Records `entity` under its current key. A different live instance already
    /// registered for that key is kept and returned.
    pub fn register(&mut self, entity: &Entity) -> Option<Entity> {
        let key = entity.key()?;
        let slot = self.entries.entry(entity.name()).or_default().entry(key).or_default();
        match Entity::upgrade(slot) {
            Some(live) if !Entity::ptr_eq(&live, entity) => Some(live),
            Some(_) => None,
            None => {
                *slot = entity.downgrade();
                None
            }
        }
    }

    pub fn remove(&mut self, resource: &str, key: &KeyValue) -> Option<Entity> {
        let evicted = self.entries.get_mut(resource)?.remove(key)?;
        tracing::trace!(resource, key = %key, "evicted from identity cache");
        Entity::upgrade(&evicted)
    }

    /// Evicts `key` only while it still maps to `entity` (or to nothing live).
    pub(crate) fn forget(&mut self, resource: &str, key: &KeyValue, entity: &Entity) -> bool {
        let Some(keys) = self.entries.get_mut(resource) else {
            return false;
        };
        let owned = match keys.get(key).map(Entity::upgrade) {
            Some(Some(live)) => Entity::ptr_eq(&live, entity),
            Some(None) => true,
            None => false,
        };
        if owned {
            keys.remove(key);
            tracing::trace!(resource, key = %key, "evicted from identity cache");
        }
        owned
    }

    /// Drops entries whose instance is gone. Returns how many were dropped.
    pub fn purge(&mut self) -> usize {
        let mut dropped = 0;
        for keys in self.entries.values_mut() {
            let before = keys.len();
            keys.retain(|_, weak| weak.strong_count() > 0);
            dropped += before - keys.len();
        }
        self.entries.retain(|_, keys| !keys.is_empty());
        dropped
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|keys| keys.values())
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
