//! Resolve resource definitions into a `Registry`, from in-memory structs or a JSON file.

use crate::config::resolved::{FieldMap, Key, Registry, ResourceMap, ScalarType};
use crate::config::types::*;
use crate::config::validate;
use crate::error::MetadataError;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use std::path::Path;

/// Build the registry from definitions. Validates first.
pub fn resolve(config: &RegistryConfig) -> Result<Registry, MetadataError> {
    validate(config)?;
    let by_name: HashMap<&str, &ResourceConfig> = config.resources.iter().map(|r| (r.name.as_str(), r)).collect();

    let mut maps = Vec::with_capacity(config.resources.len());
    for r in &config.resources {
        let mut fields = Vec::with_capacity(r.fields.len());
        for (index, f) in r.fields.iter().enumerate() {
            let storage = storage_of(&by_name, r, f, &mut Vec::new())?;
            let default = match (&f.default, storage) {
                (Some(json), Some(storage)) => default_value(&r.name, &f.name, json, storage)?,
                _ => Value::Null,
            };
            fields.push(FieldMap {
                index,
                name: f.name.clone(),
                column: f.column.clone().unwrap_or_else(|| f.name.clone()),
                data_type: f.type_.clone(),
                storage,
                transient: f.transient,
                default,
            });
        }
        let key = Key {
            fields: r
                .key
                .names()
                .iter()
                .filter_map(|k| r.fields.iter().position(|f| f.name == *k))
                .collect(),
        };
        maps.push(ResourceMap {
            name: r.name.clone(),
            table: r.table.clone().unwrap_or_else(|| r.name.clone()),
            fields,
            key,
        });
    }
    Ok(Registry::from_maps(maps))
}

/// Read a JSON file of resource definitions and resolve it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Registry, MetadataError> {
    let text = std::fs::read_to_string(path.as_ref()).map_err(|e| MetadataError::Load(e.to_string()))?;
    load_from_str(&text)
}

pub fn load_from_str(json: &str) -> Result<Registry, MetadataError> {
    let config: RegistryConfig = serde_json::from_str(json).map_err(|e| MetadataError::Load(e.to_string()))?;
    resolve(&config)
}

/// Column storage of a field. References follow the target's key field, possibly
/// through further references; `visiting` catches a chain that returns to itself.
fn storage_of<'a>(
    by_name: &HashMap<&str, &'a ResourceConfig>,
    resource: &'a ResourceConfig,
    field: &'a FieldConfig,
    visiting: &mut Vec<(&'a str, &'a str)>,
) -> Result<Option<ScalarType>, MetadataError> {
    Ok(Some(match &field.type_ {
        DataType::Int => ScalarType::Int,
        DataType::Long => ScalarType::Long,
        DataType::String => ScalarType::String,
        DataType::Date => ScalarType::Date,
        DataType::Time => ScalarType::Time,
        DataType::DateTime => ScalarType::DateTime,
        DataType::Many(_) => return Ok(None),
        DataType::Reference(target) => {
            let here = (resource.name.as_str(), field.name.as_str());
            if visiting.contains(&here) {
                return Err(MetadataError::KeyReferenceLoop(resource.name.clone()));
            }
            visiting.push(here);
            let target_config: &'a ResourceConfig = by_name.get(target.as_str()).copied().ok_or_else(|| MetadataError::MissingReference {
                kind: "resource",
                resource: resource.name.clone(),
                name: target.clone(),
            })?;
            let key_name = target_config.key.names().first().copied().unwrap_or_default();
            let key_field = target_config
                .fields
                .iter()
                .find(|f| f.name == key_name)
                .ok_or_else(|| MetadataError::EmptyKey(target.clone()))?;
            return storage_of(by_name, target_config, key_field, visiting);
        }
    }))
}

fn default_value(
    resource: &str,
    field: &str,
    json: &serde_json::Value,
    storage: ScalarType,
) -> Result<Value, MetadataError> {
    let invalid = |reason: String| MetadataError::InvalidDefault {
        resource: resource.to_string(),
        field: field.to_string(),
        reason,
    };
    if json.is_null() {
        return Ok(Value::Null);
    }
    let text = || json.as_str().ok_or_else(|| invalid(format!("expected a string for {}", storage.name())));
    Ok(match storage {
        ScalarType::Int => {
            let n = json.as_i64().ok_or_else(|| invalid("expected an integer".into()))?;
            Value::Int(i32::try_from(n).map_err(|e| invalid(e.to_string()))?)
        }
        ScalarType::Long => Value::Long(json.as_i64().ok_or_else(|| invalid("expected an integer".into()))?),
        ScalarType::String => Value::String(text()?.to_string()),
        ScalarType::Date => {
            Value::Date(NaiveDate::parse_from_str(text()?, "%Y-%m-%d").map_err(|e| invalid(e.to_string()))?)
        }
        ScalarType::Time => Value::Time(text()?.parse::<NaiveTime>().map_err(|e| invalid(e.to_string()))?),
        ScalarType::DateTime => Value::DateTime(
            DateTime::parse_from_rfc3339(text()?)
                .map_err(|e| invalid(e.to_string()))?
                .with_timezone(&Utc),
        ),
    })
}
