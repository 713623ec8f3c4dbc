//! Result cursor: pulls rows lazily and reconciles each with the identity cache.

use crate::cache::IdentityCache;
use crate::config::{DataType, FieldMap, ResourceMap};
use crate::entity::Entity;
use crate::error::{Phase, StoreError};
use crate::sql::bridge;
use crate::value::{Datum, KeyValue, Reference, Value};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Ready,
    HasRow,
    Exhausted,
}

/// Rows of one SELECT, materialized one at a time. Borrows the engine that issued it.
pub struct RecordSet<'e> {
    map: Arc<ResourceMap>,
    sql: &'e str,
    rows: Option<BoxStream<'e, Result<SqliteRow, sqlx::Error>>>,
    cache: &'e mut IdentityCache,
    state: CursorState,
    current: Option<Entity>,
}

impl<'e> RecordSet<'e> {
    pub(crate) fn new(
        map: Arc<ResourceMap>,
        sql: &'e str,
        rows: BoxStream<'e, Result<SqliteRow, sqlx::Error>>,
        cache: &'e mut IdentityCache,
    ) -> Self {
        RecordSet {
            map,
            sql,
            rows: Some(rows),
            cache,
            state: CursorState::Ready,
            current: None,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Moves to the next row. `false` once the rows are used up, and on every call after.
    /// A driver or conversion error ends the cursor.
    pub async fn advance(&mut self) -> Result<bool, StoreError> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(false);
        };
        let next = match rows.try_next().await {
            Ok(next) => next,
            Err(e) => {
                self.release();
                return Err(StoreError::driver(Phase::Execute, self.sql)(e));
            }
        };
        match next {
            Some(row) => match materialize(&row, &self.map, self.cache, self.sql) {
                Ok(entity) => {
                    self.current = Some(entity);
                    self.state = CursorState::HasRow;
                    Ok(true)
                }
                Err(e) => {
                    self.release();
                    Err(e)
                }
            },
            None => {
                self.release();
                Ok(false)
            }
        }
    }

    /// Instance for the row the cursor is on.
    pub fn current(&self) -> Result<Entity, StoreError> {
        match (self.state, &self.current) {
            (CursorState::Ready, _) => Err(StoreError::CursorNotStarted),
            (CursorState::HasRow, Some(entity)) => Ok(entity.clone()),
            _ => Err(StoreError::CursorExhausted),
        }
    }

    pub async fn next(&mut self) -> Result<Option<Entity>, StoreError> {
        if self.advance().await? {
            self.current().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Drains the remaining rows.
    pub async fn collect(&mut self) -> Result<Vec<Entity>, StoreError> {
        let mut out = Vec::new();
        while let Some(entity) = self.next().await? {
            out.push(entity);
        }
        Ok(out)
    }

    fn release(&mut self) {
        if self.rows.take().is_some() {
            tracing::trace!(sql = %self.sql, "row stream released");
        }
        self.state = CursorState::Exhausted;
        self.current = None;
    }
}

/// Turns one row into the cached instance for its key, overwriting every persisted field.
/// Columns are the persisted fields in declaration order.
pub(crate) fn materialize(
    row: &SqliteRow,
    map: &Arc<ResourceMap>,
    cache: &mut IdentityCache,
    sql: &str,
) -> Result<Entity, StoreError> {
    let persisted: Vec<&FieldMap> = map.persisted().collect();
    let values = persisted
        .iter()
        .enumerate()
        .map(|(i, f)| bridge::extract(row, i, &map.name, f, sql))
        .collect::<Result<Vec<Value>, _>>()?;

    let key = map
        .key
        .fields
        .iter()
        .map(|&id| {
            persisted
                .iter()
                .position(|f| f.index == id)
                .map(|pos| values[pos].clone())
                .unwrap_or(Value::Null)
        })
        .collect::<Vec<_>>();
    let key = KeyValue::new(key);
    let entity = if key.is_complete() {
        cache.find(map, &key)
    } else {
        Entity::new(Arc::clone(map))
    };

    for (field, value) in persisted.into_iter().zip(values) {
        let datum = match &field.data_type {
            DataType::Reference(target) => {
                let live = if value.is_null() {
                    None
                } else {
                    cache.get(target, &KeyValue::from(value.clone()))
                };
                Datum::Reference(match live {
                    Some(target) => Reference::ByValue(target),
                    None => Reference::ByKey(value),
                })
            }
            _ => Datum::Value(value),
        };
        entity.overwrite(field.index, datum);
    }
    Ok(entity)
}
