//! Entity instances: one record of field slots shared through a cloneable handle.

use crate::config::{FieldId, ResourceMap};
use crate::error::StoreError;
use crate::sql::bridge;
use crate::value::{Datum, KeyValue, Reference, Value};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Field slots of one instance. `None` means the field was never supplied.
#[derive(Debug)]
pub struct Record {
    pub(crate) map: Arc<ResourceMap>,
    pub(crate) slots: Vec<Option<Datum>>,
}

pub(crate) type WeakRecord = Weak<RwLock<Record>>;

/// Handle to a live instance. Clones share the same record; equality of
/// identity is `Entity::ptr_eq`.
#[derive(Clone)]
pub struct Entity(Arc<RwLock<Record>>);

impl Entity {
    pub fn new(map: Arc<ResourceMap>) -> Self {
        let slots = vec![None; map.fields.len()];
        Entity(Arc::new(RwLock::new(Record { map, slots })))
    }

    /// New instance whose key slots hold `key`, already normalized for `map`.
    pub(crate) fn with_key(map: Arc<ResourceMap>, key: &KeyValue) -> Self {
        let entity = Entity::new(map);
        {
            let mut record = entity.0.write();
            let key_fields = record.map.key.fields.clone();
            for (id, part) in key_fields.into_iter().zip(key.parts()) {
                let datum = key_datum(&record.map, id, part.clone());
                record.slots[id] = Some(datum);
            }
        }
        entity
    }

    pub fn map(&self) -> Arc<ResourceMap> {
        Arc::clone(&self.0.read().map)
    }

    pub fn name(&self) -> String {
        self.0.read().map.name.clone()
    }

    pub fn ptr_eq(a: &Entity, b: &Entity) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Address of the shared record; stable while any handle is alive.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> WeakRecord {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &WeakRecord) -> Option<Entity> {
        weak.upgrade().map(Entity)
    }

    pub fn get(&self, field: &str) -> Result<Option<Datum>, StoreError> {
        let record = self.0.read();
        let id = record.map.field_index(field)?;
        Ok(record.slots[id].clone())
    }

    pub fn get_at(&self, id: FieldId) -> Option<Datum> {
        self.0.read().slots.get(id).cloned().flatten()
    }

    pub fn is_present(&self, field: &str) -> Result<bool, StoreError> {
        Ok(self.get(field)?.is_some())
    }

    /// Scalar value of a field, or the foreign key a reference stores.
    pub fn value(&self, field: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get(field)?.and_then(|d| d.as_value()))
    }

    pub fn reference(&self, field: &str) -> Result<Option<Reference>, StoreError> {
        Ok(match self.get(field)? {
            Some(Datum::Reference(r)) => Some(r),
            _ => None,
        })
    }

    /// Members of a collection field; empty when absent.
    pub fn items(&self, field: &str) -> Result<Vec<Entity>, StoreError> {
        Ok(match self.get(field)? {
            Some(Datum::Many(items)) => items,
            _ => Vec::new(),
        })
    }

    /// Stores a value, converted to the field's declared shape.
    pub fn set(&self, field: &str, value: impl Into<Datum>) -> Result<(), StoreError> {
        let map = self.map();
        let id = map.field_index(field)?;
        self.set_at(id, value.into())
    }

    pub fn set_at(&self, id: FieldId, datum: Datum) -> Result<(), StoreError> {
        let map = self.map();
        let field = map.fields.get(id).ok_or_else(|| StoreError::UnknownField {
            resource: map.name.clone(),
            field: id.to_string(),
        })?;
        // Conversion may read other records; the write lock is taken afterwards.
        let datum = bridge::coerce_datum(&map.name, field, datum)?;
        self.0.write().slots[id] = Some(datum);
        Ok(())
    }

    /// Marks a field absent again.
    pub fn unset(&self, field: &str) -> Result<(), StoreError> {
        let map = self.map();
        let id = map.field_index(field)?;
        self.0.write().slots[id] = None;
        Ok(())
    }

    /// Current key; `None` while any key part is absent or null.
    pub fn key(&self) -> Option<KeyValue> {
        let (map, parts) = {
            let record = self.0.read();
            let parts: Vec<Option<Datum>> = record.map.key.fields.iter().map(|&i| record.slots[i].clone()).collect();
            (Arc::clone(&record.map), parts)
        };
        if map.key.is_empty() {
            return None;
        }
        let values = parts
            .into_iter()
            .map(|d| d.and_then(|d| d.as_value()).filter(|v| !v.is_null()))
            .collect::<Option<Vec<Value>>>()?;
        Some(KeyValue::new(values))
    }

    /// Sets every key slot from `key` after arity and type checks.
    pub fn set_key(&self, key: impl Into<KeyValue>) -> Result<(), StoreError> {
        let map = self.map();
        let key = map.key_value(key.into())?;
        let mut record = self.0.write();
        for (&id, part) in map.key.fields.iter().zip(key.into_parts()) {
            record.slots[id] = Some(key_datum(&map, id, part));
        }
        Ok(())
    }

    /// Copy of every slot, taken under one read lock.
    pub(crate) fn snapshot(&self) -> Vec<Option<Datum>> {
        self.0.read().slots.clone()
    }

    /// Stores an already-converted datum.
    pub(crate) fn overwrite(&self, id: FieldId, datum: Datum) {
        self.0.write().slots[id] = Some(datum);
    }

    pub(crate) fn clear_at(&self, id: FieldId) {
        self.0.write().slots[id] = None;
    }

    /// Copies every present slot of `other` into this record.
    pub(crate) fn copy_present_from(&self, other: &Entity) {
        if Entity::ptr_eq(self, other) {
            return;
        }
        let slots = other.snapshot();
        let mut record = self.0.write();
        for (id, slot) in slots.into_iter().enumerate() {
            if let Some(datum) = slot {
                if let Some(target) = record.slots.get_mut(id) {
                    *target = Some(datum);
                }
            }
        }
    }
}

fn key_datum(map: &ResourceMap, id: FieldId, part: Value) -> Datum {
    if map.fields[id].data_type.is_reference() {
        Datum::Reference(Reference::ByKey(part))
    } else {
        Datum::Value(part)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only the key: references may form cycles.
        match self.key() {
            Some(key) => write!(f, "{}({})", self.name(), key),
            None => write!(f, "{}(<new>)", self.name()),
        }
    }
}
