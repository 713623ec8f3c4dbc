//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a resolved resource map.

use crate::config::{FieldMap, ResourceMap};
use crate::error::StoreError;
use crate::sql::bridge;
use crate::sql::dialect::Dialect;
use crate::sql::params::BindValue;
use crate::value::{KeyValue, Value};

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, map: &ResourceMap, field: &FieldMap, value: &Value) -> Result<(), StoreError> {
        self.params.push(bridge::bind(&map.name, field, value)?);
        Ok(())
    }
}

/// SELECT list: persisted fields in declaration order, so row column i is the i-th persisted field.
fn select_column_list(map: &ResourceMap, dialect: &dyn Dialect) -> String {
    map.persisted()
        .map(|f| dialect.quote(&f.column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Appends ` WHERE "k1"=? AND "k2"=?` in key order, binding each part.
fn push_key_filter(q: &mut QueryBuf, map: &ResourceMap, dialect: &dyn Dialect, key: &KeyValue) -> Result<(), StoreError> {
    if key.len() != map.key.len() {
        return Err(StoreError::KeyArity {
            resource: map.name.clone(),
            expected: map.key.len(),
            got: key.len(),
        });
    }
    let mut where_parts = Vec::with_capacity(key.len());
    for (field, part) in map.key_fields().zip(key.parts()) {
        where_parts.push(format!("{}=?", dialect.quote(&field.column)));
        q.push_param(map, field, part)?;
    }
    q.sql.push_str(" WHERE ");
    q.sql.push_str(&where_parts.join(" AND "));
    Ok(())
}

/// SELECT every row. No parameters.
pub fn select_all(map: &ResourceMap, dialect: &dyn Dialect) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {}",
        select_column_list(map, dialect),
        dialect.quote(&map.table)
    );
    q
}

/// SELECT by key, parts bound in key order.
pub fn select_by_key(map: &ResourceMap, dialect: &dyn Dialect, key: &KeyValue) -> Result<QueryBuf, StoreError> {
    let mut q = select_all(map, dialect);
    push_key_filter(&mut q, map, dialect, key)?;
    Ok(q)
}

/// INSERT of the given columns, in the given order.
pub fn insert(map: &ResourceMap, dialect: &dyn Dialect, row: &[(&FieldMap, Value)]) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    for (field, value) in row {
        if !field.is_persisted() {
            return Err(StoreError::InvalidFieldShape(field.full_name(&map.name)));
        }
        cols.push(dialect.quote(&field.column));
        placeholders.push("?");
        q.push_param(map, field, value)?;
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(&map.table),
        cols.join(", "),
        placeholders.join(", ")
    );
    Ok(q)
}

/// UPDATE of the given columns for one key. With nothing to set, the first key
/// column is assigned to itself so the statement still reports the matched row.
pub fn update(
    map: &ResourceMap,
    dialect: &dyn Dialect,
    set: &[(&FieldMap, Value)],
    key: &KeyValue,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let mut set_parts = Vec::with_capacity(set.len().max(1));
    for (field, value) in set {
        if !field.is_persisted() {
            return Err(StoreError::InvalidFieldShape(field.full_name(&map.name)));
        }
        set_parts.push(format!("{}=?", dialect.quote(&field.column)));
        q.push_param(map, field, value)?;
    }
    if set_parts.is_empty() {
        if let Some(first) = map.key_fields().next() {
            let col = dialect.quote(&first.column);
            set_parts.push(format!("{}={}", col, col));
        }
    }
    q.sql = format!("UPDATE {} SET {}", dialect.quote(&map.table), set_parts.join(", "));
    push_key_filter(&mut q, map, dialect, key)?;
    Ok(q)
}

/// DELETE one row by key.
pub fn delete(map: &ResourceMap, dialect: &dyn Dialect, key: &KeyValue) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    q.sql = format!("DELETE FROM {}", dialect.quote(&map.table));
    push_key_filter(&mut q, map, dialect, key)?;
    Ok(q)
}
