//! Unit-of-work engine: one transaction on one connection, CRUD over registered resources.

use crate::cache::IdentityCache;
use crate::config::{DataType, FieldId, FieldMap, Registry, ScalarType};
use crate::entity::Entity;
use crate::error::{Phase, StoreError};
use crate::migration::create_table_sql;
use crate::service::plan::pending_references;
use crate::service::record_set::{materialize, RecordSet};
use crate::sql::{self, BindValue, Dialect, Sqlite};
use crate::value::{Datum, KeyValue, Reference, Value};
use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteConnection, SqliteQueryResult};
use sqlx::{Connection, Executor, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Open,
    Committed,
    RolledBack,
}

/// Row inserted by the open transaction: its cache entry, and the key slot
/// filled from the generated row id, if any.
struct Inserted {
    entity: Entity,
    key: KeyValue,
    generated: Option<FieldId>,
}

/// Owns one transaction. Every operation other than `close` fails with
/// `EngineClosed` once the transaction has been committed or rolled back.
/// Dropping an open engine rolls the transaction back.
///
/// When the transaction does not commit, instances inserted through it lose
/// their generated keys and their cache entries.
pub struct Engine<'c> {
    tx: Option<Transaction<'c, sqlx::Sqlite>>,
    state: EngineState,
    registry: Arc<Registry>,
    cache: IdentityCache,
    dialect: Arc<dyn Dialect>,
    /// SELECT text per resource, kept so cursors can borrow it.
    statements: HashMap<String, String>,
    inserted: Vec<Inserted>,
}

impl<'c> Engine<'c> {
    /// Starts a transaction on `conn` with a fresh identity cache.
    pub async fn begin(conn: &'c mut SqliteConnection, registry: Arc<Registry>) -> Result<Self, StoreError> {
        Self::with_cache(conn, registry, IdentityCache::new()).await
    }

    /// Starts a transaction on `conn`, continuing with an existing identity cache.
    pub async fn with_cache(
        conn: &'c mut SqliteConnection,
        registry: Arc<Registry>,
        cache: IdentityCache,
    ) -> Result<Self, StoreError> {
        let tx = conn
            .begin()
            .await
            .map_err(StoreError::driver(Phase::Transaction, "BEGIN"))?;
        Ok(Self::from_transaction(tx, registry, cache))
    }

    pub fn from_transaction(tx: Transaction<'c, sqlx::Sqlite>, registry: Arc<Registry>, cache: IdentityCache) -> Self {
        tracing::debug!("transaction started");
        Engine {
            tx: Some(tx),
            state: EngineState::Open,
            registry,
            cache,
            dialect: Arc::new(Sqlite),
            statements: HashMap::new(),
            inserted: Vec::new(),
        }
    }

    pub fn with_dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self.statements.clear();
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// New instance of a registered resource.
    pub fn create(&self, resource: &str) -> Result<Entity, StoreError> {
        self.registry.create(resource)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        match self.state {
            EngineState::Open => Ok(()),
            _ => Err(StoreError::EngineClosed),
        }
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection, StoreError> {
        self.ensure_open()?;
        self.tx.as_deref_mut().ok_or(StoreError::EngineClosed)
    }

    async fn execute(&mut self, sql: &str, params: &[BindValue]) -> Result<SqliteQueryResult, StoreError> {
        tracing::debug!(sql = %sql, params = ?params, "execute");
        let conn = self.conn()?;
        (&mut *conn)
            .prepare(sql)
            .await
            .map_err(StoreError::driver(Phase::Prepare, sql))?;
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(p.clone());
        }
        query
            .execute(&mut *conn)
            .await
            .map_err(StoreError::driver(Phase::Execute, sql))
    }

    fn expect_one(operation: &'static str, resource: &str, result: &SqliteQueryResult) -> Result<(), StoreError> {
        match result.rows_affected() {
            1 => Ok(()),
            affected => Err(StoreError::AffectedRowMismatch {
                operation,
                resource: resource.to_string(),
                affected,
            }),
        }
    }

    /// Fetches one row by key. Extra rows are drained and reported, the first wins.
    pub async fn fetch(&mut self, resource: &str, key: impl Into<KeyValue>) -> Result<Option<Entity>, StoreError> {
        self.ensure_open()?;
        let map = self.registry.get(resource)?;
        let key = map.key_value(key.into())?;
        let q = sql::select_by_key(&map, self.dialect.as_ref(), &key)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");

        let Engine { tx, cache, .. } = self;
        let conn = tx.as_deref_mut().ok_or(StoreError::EngineClosed)?;
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let mut rows = query.fetch(&mut *conn);
        let Some(row) = rows
            .try_next()
            .await
            .map_err(StoreError::driver(Phase::Execute, &q.sql))?
        else {
            return Ok(None);
        };
        let entity = materialize(&row, &map, cache, &q.sql)?;

        let mut extra = 0usize;
        while rows
            .try_next()
            .await
            .map_err(StoreError::driver(Phase::Execute, &q.sql))?
            .is_some()
        {
            extra += 1;
        }
        if extra > 0 {
            tracing::warn!(resource, key = %key, extra, "fetch by key matched more than one row; using the first");
        }
        Ok(Some(entity))
    }

    /// Cursor over every row of a resource. Rows are read as the cursor advances.
    pub fn fetch_all(&mut self, resource: &str) -> Result<RecordSet<'_>, StoreError> {
        self.ensure_open()?;
        let map = self.registry.get(resource)?;
        let Engine {
            tx,
            cache,
            dialect,
            statements,
            ..
        } = self;
        let text: &String = statements
            .entry(map.name.clone())
            .or_insert_with(|| sql::select_all(&map, &**dialect).sql);
        tracing::debug!(sql = %text, "query");
        let conn = tx.as_deref_mut().ok_or(StoreError::EngineClosed)?;
        let rows = sqlx::query(text.as_str()).fetch(conn);
        Ok(RecordSet::new(map, text.as_str(), rows, cache))
    }

    /// Inserts `entity`, first inserting every keyless instance it links to.
    pub async fn insert(&mut self, entity: &Entity) -> Result<(), StoreError> {
        self.ensure_open()?;
        for dependency in pending_references(entity)? {
            self.insert_row(&dependency).await?;
        }
        self.insert_row(entity).await
    }

    async fn insert_row(&mut self, entity: &Entity) -> Result<(), StoreError> {
        let map = entity.map();
        let slots = entity.snapshot();
        let row: Vec<(&FieldMap, Value)> = map
            .persisted()
            .map(|f| {
                let value = match &slots[f.index] {
                    Some(datum) => datum.as_value().unwrap_or(Value::Null),
                    None => f.default.clone(),
                };
                (f, value)
            })
            .collect();
        let q = sql::insert(&map, self.dialect.as_ref(), &row)?;
        let result = self.execute(&q.sql, &q.params).await?;
        Self::expect_one("insert", &map.name, &result)?;

        let mut generated = None;
        if entity.key().is_none() {
            let field = map
                .single_key_field()
                .filter(|f| !f.data_type.is_reference() && f.storage.is_some_and(ScalarType::is_integer));
            match (field, result.last_insert_rowid()) {
                (Some(field), rowid) if rowid != 0 => {
                    entity.set_at(field.index, Datum::Value(Value::Long(rowid)))?;
                    generated = Some(field.index);
                }
                _ => return Err(StoreError::GeneratedKeyMissing(map.name.clone())),
            }
        }

        if let Some(key) = entity.key() {
            self.cache.remove(&map.name, &key);
            self.cache.register(entity);
            self.inserted.push(Inserted {
                entity: entity.clone(),
                key,
                generated,
            });
        }
        Ok(())
    }

    /// Updates the present non-key fields of `entity`, first inserting every keyless
    /// instance it links to. Absent fields keep their stored values.
    pub async fn update(&mut self, entity: &Entity) -> Result<(), StoreError> {
        self.ensure_open()?;
        let map = entity.map();
        let key = entity
            .key()
            .ok_or_else(|| StoreError::MissingKeyForUpdate(map.name.clone()))?;
        for dependency in pending_references(entity)? {
            self.insert_row(&dependency).await?;
        }

        let slots = entity.snapshot();
        let set: Vec<(&FieldMap, Value)> = map
            .persisted()
            .filter(|f| !map.key.contains(f.index))
            .filter_map(|f| {
                slots[f.index]
                    .as_ref()
                    .map(|datum| (f, datum.as_value().unwrap_or(Value::Null)))
            })
            .collect();
        let q = sql::update(&map, self.dialect.as_ref(), &set, &key)?;
        let result = self.execute(&q.sql, &q.params).await?;
        Self::expect_one("update", &map.name, &result)?;

        if let Some(live) = self.cache.register(entity) {
            live.copy_present_from(entity);
        }
        Ok(())
    }

    /// Deletes one row by key and evicts it from the identity cache.
    pub async fn delete(&mut self, resource: &str, key: impl Into<KeyValue>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let map = self.registry.get(resource)?;
        let key = map.key_value(key.into())?;
        let q = sql::delete(&map, self.dialect.as_ref(), &key)?;
        let result = self.execute(&q.sql, &q.params).await?;
        Self::expect_one("delete", &map.name, &result)?;
        self.cache.remove(&map.name, &key);
        Ok(())
    }

    /// Loads the target of a reference field held by key and links it in place.
    /// `None` when the field is absent, null, or names a row that does not exist.
    pub async fn resolve(&mut self, entity: &Entity, field: &str) -> Result<Option<Entity>, StoreError> {
        self.ensure_open()?;
        let map = entity.map();
        let id = map.field_index(field)?;
        let field = &map.fields[id];
        let DataType::Reference(target) = &field.data_type else {
            return Err(StoreError::conversion(&field.full_name(&map.name), "reference", &field.data_type));
        };
        match entity.get_at(id) {
            Some(Datum::Reference(Reference::ByValue(live))) => Ok(Some(live)),
            Some(Datum::Reference(Reference::ByKey(key))) if !key.is_null() => {
                let found = self.fetch(target, key).await?;
                if let Some(live) = &found {
                    entity.overwrite(id, Datum::Reference(Reference::ByValue(live.clone())));
                }
                Ok(found)
            }
            _ => Ok(None),
        }
    }

    /// Creates the resource's table if it does not exist.
    pub async fn create_table(&mut self, resource: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        let map = self.registry.get(resource)?;
        let ddl = create_table_sql(&map, self.dialect.as_ref())?;
        self.execute(&ddl, &[]).await?;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let tx = self.tx.take().ok_or(StoreError::EngineClosed)?;
        let result = tx.commit().await;
        self.state = match result {
            Ok(()) => {
                self.inserted.clear();
                EngineState::Committed
            }
            Err(_) => {
                self.discard_inserted();
                EngineState::RolledBack
            }
        };
        tracing::debug!(state = ?self.state, "transaction finished");
        result.map_err(StoreError::driver(Phase::Transaction, "COMMIT"))
    }

    pub async fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let tx = self.tx.take().ok_or(StoreError::EngineClosed)?;
        self.state = EngineState::RolledBack;
        self.discard_inserted();
        tracing::debug!("transaction rolled back");
        tx.rollback()
            .await
            .map_err(StoreError::driver(Phase::Transaction, "ROLLBACK"))
    }

    /// Ends the unit of work, rolling back if still open, and hands back the identity cache.
    pub async fn close(mut self) -> Result<IdentityCache, StoreError> {
        if self.state == EngineState::Open {
            self.rollback().await?;
        }
        Ok(std::mem::take(&mut self.cache))
    }

    /// Undoes what uncommitted inserts did outside the database, newest first.
    fn discard_inserted(&mut self) {
        for Inserted { entity, key, generated } in self.inserted.drain(..).rev() {
            self.cache.forget(&entity.name(), &key, &entity);
            if let Some(id) = generated {
                entity.clear_at(id);
            }
        }
    }
}

impl Drop for Engine<'_> {
    fn drop(&mut self) {
        if self.state == EngineState::Open {
            self.discard_inserted();
        }
    }
}
