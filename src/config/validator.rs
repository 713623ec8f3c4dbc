//! Config validation: identifiers, keys and referential integrity between resources.

use crate::config::{DataType, RegistryConfig, ResourceConfig};
use crate::error::MetadataError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const IDENTIFIER: &str = "^[A-Za-z_][A-Za-z0-9_]*$";

fn check_identifier(re: &Regex, s: &str) -> Result<(), MetadataError> {
    if re.is_match(s) {
        Ok(())
    } else {
        Err(MetadataError::InvalidIdentifier(s.to_string()))
    }
}

pub fn validate(config: &RegistryConfig) -> Result<(), MetadataError> {
    let re = Regex::new(IDENTIFIER).map_err(|e| MetadataError::Load(e.to_string()))?;

    let mut by_name: HashMap<&str, &ResourceConfig> = HashMap::new();
    for r in &config.resources {
        check_identifier(&re, &r.name)?;
        if by_name.insert(r.name.as_str(), r).is_some() {
            return Err(MetadataError::DuplicateResource(r.name.clone()));
        }
    }

    for r in &config.resources {
        check_identifier(&re, r.table.as_deref().unwrap_or(&r.name))?;

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for f in &r.fields {
            check_identifier(&re, &f.name)?;
            if !names.insert(f.name.as_str()) {
                return Err(MetadataError::DuplicateField {
                    resource: r.name.clone(),
                    field: f.name.clone(),
                });
            }
            let column = f.column.as_deref().unwrap_or(&f.name);
            check_identifier(&re, column)?;
            if !f.transient && !f.type_.is_many() && !columns.insert(column) {
                return Err(MetadataError::DuplicateField {
                    resource: r.name.clone(),
                    field: column.to_string(),
                });
            }

            if let Some(target) = f.type_.target() {
                let target_config = by_name.get(target).ok_or_else(|| MetadataError::MissingReference {
                    kind: "resource",
                    resource: r.name.clone(),
                    name: target.to_string(),
                })?;
                if f.type_.is_reference() && target_config.key.names().len() != 1 {
                    return Err(MetadataError::CompositeReferenceTarget {
                        resource: r.name.clone(),
                        field: f.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
            if f.default.is_some() && matches!(f.type_, DataType::Many(_)) {
                return Err(MetadataError::InvalidDefault {
                    resource: r.name.clone(),
                    field: f.name.clone(),
                    reason: "collections take no default".into(),
                });
            }
        }

        let key = r.key.names();
        if key.is_empty() {
            return Err(MetadataError::EmptyKey(r.name.clone()));
        }
        let mut seen = HashSet::new();
        for k in key {
            let invalid = |reason| MetadataError::InvalidKey {
                resource: r.name.clone(),
                field: k.to_string(),
                reason,
            };
            if !seen.insert(k) {
                return Err(invalid("listed twice"));
            }
            let field = r.fields.iter().find(|f| f.name == k).ok_or_else(|| invalid("unknown field"))?;
            if field.transient {
                return Err(invalid("transient"));
            }
            if field.type_.is_many() {
                return Err(invalid("collection"));
            }
        }
    }

    Ok(())
}
