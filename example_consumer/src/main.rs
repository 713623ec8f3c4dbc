//! Example consumer: maps a small library catalog onto SQLite with resmap.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Set `RESMAP_DATABASE_URL` (e.g. `sqlite://library.db`) to keep the data between runs.

use resmap::{load_from_path, Store, StoreConfig};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resmap=debug")),
        )
        .init();

    let definitions = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/library.json");
    let registry = Arc::new(load_from_path(definitions)?);

    // A single connection keeps an in-memory database alive across engines.
    let mut config = StoreConfig::from_env();
    if config.database_url.contains(":memory:") {
        config.max_connections = 1;
    }
    let store = Store::connect(&config, registry).await?;
    store.create_tables().await?;

    let mut engine = store.begin().await?;
    let publisher = engine.create("Publisher")?;
    publisher.set("name", "Pan Books")?;
    let book = engine.create("Book")?;
    book.set("title", "Dune")?;
    book.set("isbn", "0-441-17271-7")?;
    book.set("publisher", &publisher)?;
    engine.insert(&book).await?;
    tracing::info!(book = ?book, publisher = ?publisher, "inserted");
    engine.commit().await?;
    let cache = engine.close().await?;

    let mut engine = store.begin_with_cache(cache).await?;
    {
        let mut books = engine.fetch_all("Book")?;
        while let Some(book) = books.next().await? {
            let title = book.value("title")?;
            let publisher = book.reference("publisher")?;
            tracing::info!(book = ?book, title = ?title, publisher = ?publisher, "fetched");
        }
    }
    engine.close().await?;
    Ok(())
}
