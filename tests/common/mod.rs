#![allow(dead_code)]

use resmap::config::FieldConfig;
use resmap::{resolve, DataType, Engine, Registry, RegistryConfig, ResourceConfig};
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Publisher, Author and Book: every type here has a column mapping.
pub fn library_config() -> RegistryConfig {
    RegistryConfig::new()
        .resource(
            ResourceConfig::new("Publisher")
                .table("publisher")
                .key("id")
                .field("id", DataType::Long)
                .field("name", DataType::String),
        )
        .resource(
            ResourceConfig::new("Author")
                .table("author")
                .key("id")
                .field("id", DataType::Long)
                .field("name", DataType::String),
        )
        .resource(
            ResourceConfig::new("Book")
                .table("book")
                .key("id")
                .field("id", DataType::Long)
                .field_with(FieldConfig::new("title", DataType::String).default_value("untitled".into()))
                .field("isbn", DataType::String)
                .field_with(FieldConfig::new("publisher", DataType::Reference("Publisher".into())).column("publisher_id"))
                .field("authors", DataType::Many("Author".into())),
        )
}

pub fn library() -> Arc<Registry> {
    Arc::new(resolve(&library_config()).unwrap())
}

/// Library plus resources for keys, self references and date/time columns.
pub fn registry() -> Arc<Registry> {
    let config = library_config()
        .resource(
            ResourceConfig::new("Pair")
                .table("pair")
                .key(["a", "b"])
                .field("a", DataType::Int)
                .field("b", DataType::Int)
                .field("label", DataType::String),
        )
        .resource(
            ResourceConfig::new("Person")
                .table("person")
                .key("id")
                .field("id", DataType::Long)
                .field("name", DataType::String)
                .field_with(FieldConfig::new("friend", DataType::Reference("Person".into())).column("friend_id"))
                .field_with(FieldConfig::new("nickname", DataType::String).transient()),
        )
        .resource(
            ResourceConfig::new("Event")
                .table("event")
                .key("id")
                .field("id", DataType::Long)
                .field("day", DataType::Date)
                .field("starts", DataType::Time)
                .field("at", DataType::DateTime),
        )
        .resource(
            ResourceConfig::new("Tag")
                .table("tag")
                .key("name")
                .field("name", DataType::String)
                .field("weight", DataType::Int),
        );
    Arc::new(resolve(&config).unwrap())
}

/// In-memory database with every table of `registry()` created.
pub async fn setup() -> (SqliteConnection, Arc<Registry>) {
    init_tracing();
    let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
    let registry = registry();
    {
        let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
        for name in ["Publisher", "Author", "Book", "Pair", "Person"] {
            engine.create_table(name).await.unwrap();
        }
        engine.commit().await.unwrap();
    }
    // Time and datetime have no column mapping; stored as text.
    sqlx::query(r#"CREATE TABLE "event" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "day" DATE, "starts" TEXT, "at" TEXT)"#)
        .execute(&mut conn)
        .await
        .unwrap();
    // No key constraint, so duplicate keys can be planted.
    sqlx::query(r#"CREATE TABLE "tag" ("name" TEXT, "weight" INTEGER)"#)
        .execute(&mut conn)
        .await
        .unwrap();
    (conn, registry)
}

pub async fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(conn)
        .await
        .unwrap()
}
