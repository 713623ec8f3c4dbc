//! Schema bootstrap: `CREATE TABLE IF NOT EXISTS` for a resolved resource.
//! Collections and transient fields never become columns.

use crate::config::{DataType, FieldMap, ResourceMap};
use crate::error::StoreError;
use crate::sql::Dialect;

/// Native column type of a persisted field. References take the type of the target's key.
fn column_type(map: &ResourceMap, field: &FieldMap, dialect: &dyn Dialect) -> Result<&'static str, StoreError> {
    if field.data_type.is_many() {
        return Err(StoreError::InvalidFieldShape(field.full_name(&map.name)));
    }
    field
        .storage
        .and_then(|storage| dialect.column_type(storage))
        .ok_or_else(|| StoreError::UnsupportedDataType {
            field: field.full_name(&map.name),
            data_type: field.data_type.to_string(),
        })
}

/// DDL for one resource's table. The key is declared inline when it is a single
/// field (with the dialect's auto-increment clause for integer keys), otherwise
/// as a trailing table constraint.
pub fn create_table_sql(map: &ResourceMap, dialect: &dyn Dialect) -> Result<String, StoreError> {
    let mut col_defs: Vec<String> = Vec::new();
    let single_key = map.single_key_field().map(|f| f.index);
    for field in map.persisted() {
        let mut def = format!("{} {}", dialect.quote(&field.column), column_type(map, field, dialect)?);
        if single_key == Some(field.index) {
            def.push_str(" PRIMARY KEY");
            if matches!(field.data_type, DataType::Int | DataType::Long) {
                if let Some(clause) = dialect.auto_increment() {
                    def.push(' ');
                    def.push_str(clause);
                }
            }
        }
        col_defs.push(def);
    }
    if map.key.is_composite() {
        let cols: Vec<String> = map.key_fields().map(|f| dialect.quote(&f.column)).collect();
        col_defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.quote(&map.table),
        col_defs.join(", ")
    ))
}
