//! Resolved resource metadata: definitions validated and flattened for runtime use.

use crate::config::DataType;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::sql::bridge;
use crate::value::{KeyValue, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Stable position of a field within its resource.
pub type FieldId = usize;

/// Column representation a persisted field binds and extracts as.
/// References resolve to the storage of their target's key field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarType {
    Int,
    Long,
    String,
    Date,
    Time,
    DateTime,
}

impl ScalarType {
    pub fn is_integer(self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Long)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Int => "int",
            ScalarType::Long => "long",
            ScalarType::String => "string",
            ScalarType::Date => "date",
            ScalarType::Time => "time",
            ScalarType::DateTime => "datetime",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldMap {
    pub index: FieldId,
    pub name: String,
    pub column: String,
    pub data_type: DataType,
    /// `None` for collection fields.
    pub storage: Option<ScalarType>,
    pub transient: bool,
    pub default: Value,
}

impl FieldMap {
    /// Whether the field is a column of the resource's table.
    pub fn is_persisted(&self) -> bool {
        !self.transient && !self.data_type.is_many()
    }

    /// Qualified name for diagnostics, e.g. `Book.title`.
    pub fn full_name(&self, resource: &str) -> String {
        format!("{}.{}", resource, self.name)
    }
}

/// Ordered key fields. WHERE clauses bind in this order.
#[derive(Clone, Debug)]
pub struct Key {
    pub fields: Vec<FieldId>,
}

impl Key {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.fields.contains(&field)
    }
}

#[derive(Clone, Debug)]
pub struct ResourceMap {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldMap>,
    pub key: Key,
}

impl ResourceMap {
    pub fn field(&self, name: &str) -> Option<&FieldMap> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Result<FieldId, StoreError> {
        self.field(name)
            .map(|f| f.index)
            .ok_or_else(|| StoreError::UnknownField {
                resource: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Fields that are columns, in declaration order.
    pub fn persisted(&self) -> impl Iterator<Item = &FieldMap> {
        self.fields.iter().filter(|f| f.is_persisted())
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldMap> {
        self.key.fields.iter().map(move |&i| &self.fields[i])
    }

    /// Single key field, when the key is not composite.
    pub fn single_key_field(&self) -> Option<&FieldMap> {
        match self.key.fields.as_slice() {
            [only] => Some(&self.fields[*only]),
            _ => None,
        }
    }

    /// Checks arity and converts each part to its key field's storage.
    pub fn key_value(&self, key: KeyValue) -> Result<KeyValue, StoreError> {
        if key.len() != self.key.len() {
            return Err(StoreError::KeyArity {
                resource: self.name.clone(),
                expected: self.key.len(),
                got: key.len(),
            });
        }
        let parts = self
            .key_fields()
            .zip(key.into_parts())
            .map(|(field, part)| bridge::coerce(&self.name, field, part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyValue::new(parts))
    }
}

/// Process-wide registry of resolved resources, keyed by resource name.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    resources: Vec<Arc<ResourceMap>>,
    by_name: HashMap<String, Arc<ResourceMap>>,
}

impl Registry {
    pub(crate) fn from_maps(maps: Vec<ResourceMap>) -> Self {
        let resources: Vec<Arc<ResourceMap>> = maps.into_iter().map(Arc::new).collect();
        let by_name = resources
            .iter()
            .map(|m| (m.name.clone(), Arc::clone(m)))
            .collect();
        Registry { resources, by_name }
    }

    pub fn get(&self, name: &str) -> Result<Arc<ResourceMap>, StoreError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::MetadataNotFound(name.to_string()))
    }

    /// Resources in registration order.
    pub fn resources(&self) -> &[Arc<ResourceMap>] {
        &self.resources
    }

    /// A new instance of the named resource with every field absent.
    pub fn create(&self, name: &str) -> Result<Entity, StoreError> {
        Ok(Entity::new(self.get(name)?))
    }
}
