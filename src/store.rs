//! Connection pool wrapper handing out engines, and its configuration.
//! Settings come from serde-deserialized config or from `RESMAP_*` env vars.

use crate::cache::IdentityCache;
use crate::config::Registry;
use crate::error::{Phase, StoreError};
use crate::service::Engine;
use crate::sql::{Dialect, Sqlite};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

fn default_database_url() -> String {
    "sqlite::memory:".into()
}

fn default_max_connections() -> u32 {
    5
}

fn default_create_if_missing() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            create_if_missing: default_create_if_missing(),
        }
    }
}

impl StoreConfig {
    /// From env `RESMAP_DATABASE_URL` and `RESMAP_MAX_CONNECTIONS`; defaults otherwise.
    /// An unparsable connection count falls back to the default.
    pub fn from_env() -> Self {
        let mut config = StoreConfig::default();
        if let Ok(url) = std::env::var("RESMAP_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(n) = std::env::var("RESMAP_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_connections = n;
        }
        config
    }
}

/// A pool plus the registry every engine it hands out maps against.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    registry: Arc<Registry>,
    dialect: Arc<dyn Dialect>,
}

impl Store {
    pub async fn connect(config: &StoreConfig, registry: Arc<Registry>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(StoreError::driver(Phase::Connect, &config.database_url))?
            .create_if_missing(config.create_if_missing);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(StoreError::driver(Phase::Connect, &config.database_url))?;
        tracing::debug!(url = %config.database_url, max_connections = config.max_connections, "store connected");
        Ok(Self::from_pool(pool, registry))
    }

    pub fn from_pool(pool: SqlitePool, registry: Arc<Registry>) -> Self {
        Store {
            pool,
            registry,
            dialect: Arc::new(Sqlite),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Engine on a pooled connection with a fresh identity cache.
    pub async fn begin(&self) -> Result<Engine<'static>, StoreError> {
        self.begin_with_cache(IdentityCache::new()).await
    }

    pub async fn begin_with_cache(&self, cache: IdentityCache) -> Result<Engine<'static>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::driver(Phase::Transaction, "BEGIN"))?;
        Ok(Engine::from_transaction(tx, Arc::clone(&self.registry), cache).with_dialect(Arc::clone(&self.dialect)))
    }

    /// Creates every registered resource's table in one transaction.
    pub async fn create_tables(&self) -> Result<(), StoreError> {
        let mut engine = self.begin().await?;
        for map in self.registry.resources() {
            engine.create_table(&map.name).await?;
        }
        engine.commit().await
    }
}
