mod common;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use common::{count, setup};
use resmap::{CursorState, Engine, EngineState, Entity, KeyValue, Phase, Reference, StoreError, Value};
use std::sync::Arc;

#[tokio::test]
async fn insert_then_fetch_round_trips() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let book = engine.create("Book").unwrap();
    book.set("title", "Dune").unwrap();
    book.set("isbn", "0-441-17271-7").unwrap();
    engine.insert(&book).await.unwrap();
    assert_eq!(book.key(), Some(KeyValue::from(1i64)));
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let fetched = engine.fetch("Book", 1i64).await.unwrap().unwrap();
    assert!(!Entity::ptr_eq(&fetched, &book));
    assert_eq!(fetched.value("title").unwrap(), Some(Value::from("Dune")));
    assert_eq!(fetched.value("isbn").unwrap(), Some(Value::from("0-441-17271-7")));
    assert_eq!(fetched.reference("publisher").unwrap(), Some(Reference::ByKey(Value::Null)));
    assert!(engine.fetch("Book", 2i64).await.unwrap().is_none());
}

#[tokio::test]
async fn absent_fields_are_written_as_defaults() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let book = engine.create("Book").unwrap();
    engine.insert(&book).await.unwrap();
    assert_eq!(book.get("title").unwrap(), None);

    let fetched = engine.fetch("Book", book.key().unwrap()).await.unwrap().unwrap();
    assert!(Entity::ptr_eq(&fetched, &book));
    assert_eq!(book.value("title").unwrap(), Some(Value::from("untitled")));
    assert_eq!(book.value("isbn").unwrap(), Some(Value::Null));
}

#[tokio::test]
async fn one_instance_per_key() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "P").unwrap();
    engine.insert(&publisher).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let a = engine.fetch("Publisher", 1).await.unwrap().unwrap();
    let b = engine.fetch("Publisher", 1i64).await.unwrap().unwrap();
    assert!(Entity::ptr_eq(&a, &b));
    a.set("name", "Q").unwrap();
    assert_eq!(b.value("name").unwrap(), Some(Value::from("Q")));
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn cache_survives_across_units_of_work() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "P").unwrap();
    engine.insert(&publisher).await.unwrap();
    engine.commit().await.unwrap();
    let cache = engine.close().await.unwrap();

    let mut engine = Engine::with_cache(&mut conn, registry, cache).await.unwrap();
    let fetched = engine.fetch("Publisher", 1i64).await.unwrap().unwrap();
    assert!(Entity::ptr_eq(&fetched, &publisher));
}

#[tokio::test]
async fn composite_keys_bind_in_key_order() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    for (a, b, label) in [(1, 2, "x"), (2, 1, "y")] {
        let pair = engine.create("Pair").unwrap();
        pair.set("a", a).unwrap();
        pair.set("b", b).unwrap();
        pair.set("label", label).unwrap();
        engine.insert(&pair).await.unwrap();
    }

    let change = engine.create("Pair").unwrap();
    change.set_key((1, 2)).unwrap();
    change.set("label", "z").unwrap();
    engine.update(&change).await.unwrap();

    let other = engine.fetch("Pair", (2, 1)).await.unwrap().unwrap();
    assert_eq!(other.value("label").unwrap(), Some(Value::from("y")));
    let changed = engine.fetch("Pair", (1, 2)).await.unwrap().unwrap();
    assert_eq!(changed.value("label").unwrap(), Some(Value::from("z")));

    engine.delete("Pair", (1, 2)).await.unwrap();
    assert!(engine.fetch("Pair", (1, 2)).await.unwrap().is_none());
    assert!(engine.fetch("Pair", (2, 1)).await.unwrap().is_some());
    assert!(matches!(
        engine.fetch("Pair", 1).await,
        Err(StoreError::KeyArity { expected: 2, got: 1, .. })
    ));
}

#[tokio::test]
async fn keyless_reference_is_inserted_first() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "P").unwrap();
    let first = engine.create("Book").unwrap();
    first.set("title", "One").unwrap();
    first.set("publisher", &publisher).unwrap();
    engine.insert(&first).await.unwrap();
    assert_eq!(publisher.key(), Some(KeyValue::from(1i64)));
    assert_eq!(first.value("publisher").unwrap(), Some(Value::Long(1)));

    let second = engine.create("Book").unwrap();
    second.set("title", "Two").unwrap();
    second.set("publisher", &publisher).unwrap();
    engine.insert(&second).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    assert_eq!(count(&mut conn, "publisher").await, 1);
    let fks: Vec<i64> = sqlx::query_scalar(r#"SELECT "publisher_id" FROM "book" ORDER BY "id""#)
        .fetch_all(&mut conn)
        .await
        .unwrap();
    assert_eq!(fks, vec![1, 1]);
}

#[tokio::test]
async fn update_inserts_new_references() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let book = engine.create("Book").unwrap();
    book.set("title", "T").unwrap();
    engine.insert(&book).await.unwrap();

    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "Late").unwrap();
    book.set("publisher", &publisher).unwrap();
    engine.update(&book).await.unwrap();
    assert_eq!(publisher.key(), Some(KeyValue::from(1i64)));
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    let fk: Option<i64> = sqlx::query_scalar(r#"SELECT "publisher_id" FROM "book""#)
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(fk, Some(1));
}

#[tokio::test]
async fn partial_update_keeps_absent_fields() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let book = engine.create("Book").unwrap();
    book.set("title", "A").unwrap();
    book.set("isbn", "X").unwrap();
    engine.insert(&book).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let patch = engine.create("Book").unwrap();
    patch.set("id", 1i64).unwrap();
    patch.set("title", "B").unwrap();
    engine.update(&patch).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let fetched = engine.fetch("Book", 1i64).await.unwrap().unwrap();
    assert_eq!(fetched.value("title").unwrap(), Some(Value::from("B")));
    assert_eq!(fetched.value("isbn").unwrap(), Some(Value::from("X")));
}

#[tokio::test]
async fn update_without_fields_still_checks_the_row() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    engine.insert(&publisher).await.unwrap();

    let bare = engine.create("Publisher").unwrap();
    bare.set("id", 1i64).unwrap();
    engine.update(&bare).await.unwrap();

    let missing = engine.create("Publisher").unwrap();
    missing.set("id", 42i64).unwrap();
    assert!(matches!(
        engine.update(&missing).await,
        Err(StoreError::AffectedRowMismatch { operation: "update", affected: 0, .. })
    ));
}

#[tokio::test]
async fn update_merges_into_cached_instance() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let cached = engine.create("Publisher").unwrap();
    cached.set("name", "Old").unwrap();
    engine.insert(&cached).await.unwrap();

    let patch = engine.create("Publisher").unwrap();
    patch.set("id", 1i64).unwrap();
    patch.set("name", "New").unwrap();
    engine.update(&patch).await.unwrap();
    assert_eq!(cached.value("name").unwrap(), Some(Value::from("New")));
}

#[tokio::test]
async fn zero_row_writes_are_rejected() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    assert!(matches!(
        engine.delete("Book", 99i64).await,
        Err(StoreError::AffectedRowMismatch { operation: "delete", affected: 0, .. })
    ));

    let keyless = engine.create("Book").unwrap();
    assert!(matches!(
        engine.update(&keyless).await,
        Err(StoreError::MissingKeyForUpdate(name)) if name == "Book"
    ));
}

#[tokio::test]
async fn delete_evicts_from_cache() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    engine.insert(&publisher).await.unwrap();
    assert_eq!(engine.cache().len(), 1);
    engine.delete("Publisher", 1i64).await.unwrap();
    assert!(engine.cache().is_empty());
    assert!(engine.fetch("Publisher", 1i64).await.unwrap().is_none());
}

#[tokio::test]
async fn cycles_fail_before_any_write() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let a = engine.create("Person").unwrap();
    let b = engine.create("Person").unwrap();
    a.set("name", "a").unwrap();
    b.set("name", "b").unwrap();
    a.set("friend", &b).unwrap();
    b.set("friend", &a).unwrap();
    assert!(matches!(
        engine.insert(&a).await,
        Err(StoreError::CyclicReferenceDetected(_))
    ));
    engine.commit().await.unwrap();
    engine.close().await.unwrap();
    assert_eq!(count(&mut conn, "person").await, 0);

    // Break the cycle so the records can be freed.
    b.unset("friend").unwrap();
}

#[tokio::test]
async fn generated_key_needs_a_single_integer_key() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let pair = engine.create("Pair").unwrap();
    pair.set("a", 1).unwrap();
    assert!(matches!(
        engine.insert(&pair).await,
        Err(StoreError::GeneratedKeyMissing(name)) if name == "Pair"
    ));
}

#[tokio::test]
async fn book_and_new_publisher_scenario() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "P").unwrap();
    let author = engine.create("Author").unwrap();
    author.set("name", "Frank").unwrap();
    let book = engine.create("Book").unwrap();
    book.set("title", "Dune").unwrap();
    book.set("isbn", "X").unwrap();
    book.set("publisher", &publisher).unwrap();
    book.set("authors", vec![author.clone()]).unwrap();
    engine.insert(&book).await.unwrap();

    assert_eq!(publisher.value("id").unwrap(), Some(Value::Long(1)));
    assert_eq!(book.value("id").unwrap(), Some(Value::Long(1)));
    assert_eq!(book.value("publisher").unwrap(), Some(Value::Long(1)));
    // Collections are not written.
    assert_eq!(author.key(), None);

    let fetched = engine.fetch("Book", 1i64).await.unwrap().unwrap();
    match fetched.reference("publisher").unwrap() {
        Some(Reference::ByValue(target)) => {
            assert!(Entity::ptr_eq(&target, &publisher));
            assert_eq!(target.value("name").unwrap(), Some(Value::from("P")));
        }
        other => panic!("expected a linked publisher, got {:?}", other),
    }
    engine.commit().await.unwrap();
    engine.close().await.unwrap();
    assert_eq!(count(&mut conn, "author").await, 0);
}

#[tokio::test]
async fn resolve_loads_reference_by_key() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "P").unwrap();
    let book = engine.create("Book").unwrap();
    book.set("publisher", &publisher).unwrap();
    engine.insert(&book).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let book = engine.fetch("Book", 1i64).await.unwrap().unwrap();
    assert_eq!(book.reference("publisher").unwrap(), Some(Reference::ByKey(Value::Long(1))));
    let target = engine.resolve(&book, "publisher").await.unwrap().unwrap();
    assert_eq!(target.value("name").unwrap(), Some(Value::from("P")));
    match book.reference("publisher").unwrap() {
        Some(Reference::ByValue(linked)) => assert!(Entity::ptr_eq(&linked, &target)),
        other => panic!("expected a linked publisher, got {:?}", other),
    }
    assert!(matches!(
        engine.resolve(&book, "title").await,
        Err(StoreError::Conversion { .. })
    ));
}

#[tokio::test]
async fn cursor_walks_every_row_once() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    for name in ["A", "B"] {
        let publisher = engine.create("Publisher").unwrap();
        publisher.set("name", name).unwrap();
        engine.insert(&publisher).await.unwrap();
    }

    let mut rows = engine.fetch_all("Publisher").unwrap();
    assert_eq!(rows.state(), CursorState::Ready);
    assert!(matches!(rows.current(), Err(StoreError::CursorNotStarted)));
    assert!(rows.advance().await.unwrap());
    assert_eq!(rows.current().unwrap().value("name").unwrap(), Some(Value::from("A")));
    assert!(rows.advance().await.unwrap());
    assert_eq!(rows.current().unwrap().value("name").unwrap(), Some(Value::from("B")));
    assert!(!rows.advance().await.unwrap());
    assert_eq!(rows.state(), CursorState::Exhausted);
    assert!(matches!(rows.current(), Err(StoreError::CursorExhausted)));
    assert!(!rows.advance().await.unwrap());
    drop(rows);

    let all = engine.fetch_all("Publisher").unwrap().collect().await.unwrap();
    assert_eq!(all.len(), 2);
    let again = engine.fetch("Publisher", 1i64).await.unwrap().unwrap();
    assert!(Entity::ptr_eq(&all[0], &again));
}

#[tokio::test]
async fn ambiguous_fetch_returns_first_row() {
    let (mut conn, registry) = setup().await;
    sqlx::query(r#"INSERT INTO "tag" ("name", "weight") VALUES ('x', 1), ('x', 2), ('y', 3)"#)
        .execute(&mut conn)
        .await
        .unwrap();
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let tag = engine.fetch("Tag", "x").await.unwrap().unwrap();
    assert_eq!(tag.value("weight").unwrap(), Some(Value::Int(1)));
    let next = engine.fetch("Tag", "y").await.unwrap().unwrap();
    assert_eq!(next.value("weight").unwrap(), Some(Value::Int(3)));
}

#[tokio::test]
async fn dates_and_times_round_trip() {
    let (mut conn, registry) = setup().await;
    let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let starts = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let event = engine.create("Event").unwrap();
    event.set("day", day).unwrap();
    event.set("starts", starts).unwrap();
    event.set("at", at).unwrap();
    engine.insert(&event).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let fetched = engine.fetch("Event", 1i64).await.unwrap().unwrap();
    assert_eq!(fetched.value("day").unwrap(), Some(Value::Date(day)));
    assert_eq!(fetched.value("starts").unwrap().and_then(|v| v.as_time()), Some(starts));
    assert_eq!(fetched.value("at").unwrap().and_then(|v| v.as_datetime()), Some(at));
}

#[tokio::test]
async fn closed_engine_rejects_operations() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let book = engine.create("Book").unwrap();
    engine.commit().await.unwrap();
    assert_eq!(engine.state(), EngineState::Committed);

    assert!(matches!(engine.insert(&book).await, Err(StoreError::EngineClosed)));
    assert!(matches!(engine.fetch("Book", 1i64).await, Err(StoreError::EngineClosed)));
    assert!(matches!(engine.fetch_all("Book"), Err(StoreError::EngineClosed)));
    assert!(matches!(engine.commit().await, Err(StoreError::EngineClosed)));
    assert!(engine.close().await.is_ok());
}

#[tokio::test]
async fn close_rolls_back_open_work() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    engine.insert(&publisher).await.unwrap();
    assert_eq!(publisher.key(), Some(KeyValue::from(1i64)));
    let cache = engine.close().await.unwrap();
    assert_eq!(publisher.key(), None);
    assert!(cache.is_empty());
    assert_eq!(count(&mut conn, "publisher").await, 0);
}

#[tokio::test]
async fn rolled_back_targets_are_inserted_again() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "P").unwrap();
    engine.insert(&publisher).await.unwrap();
    let cache = engine.close().await.unwrap();
    assert!(cache.get("Publisher", &KeyValue::from(1i64)).is_none());

    let mut engine = Engine::with_cache(&mut conn, registry, cache).await.unwrap();
    let book = engine.create("Book").unwrap();
    book.set("title", "Dune").unwrap();
    book.set("publisher", &publisher).unwrap();
    engine.insert(&book).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();

    assert_eq!(count(&mut conn, "publisher").await, 1);
    let fk: Option<i64> = sqlx::query_scalar(r#"SELECT "publisher_id" FROM "book""#)
        .fetch_one(&mut conn)
        .await
        .unwrap();
    let id: i64 = sqlx::query_scalar(r#"SELECT "id" FROM "publisher""#)
        .fetch_one(&mut conn)
        .await
        .unwrap();
    assert_eq!(fk, Some(id));
    assert_eq!(publisher.key(), Some(KeyValue::from(id)));
}

#[tokio::test]
async fn failed_insert_then_rollback_forgets_written_dependencies() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, Arc::clone(&registry)).await.unwrap();
    let first = engine.create("Book").unwrap();
    first.set("title", "First").unwrap();
    engine.insert(&first).await.unwrap();
    engine.commit().await.unwrap();
    let cache = engine.close().await.unwrap();

    let mut engine = Engine::with_cache(&mut conn, Arc::clone(&registry), cache).await.unwrap();
    let publisher = engine.create("Publisher").unwrap();
    publisher.set("name", "P").unwrap();
    let clash = engine.create("Book").unwrap();
    clash.set("id", 1i64).unwrap();
    clash.set("publisher", &publisher).unwrap();
    assert!(matches!(
        engine.insert(&clash).await,
        Err(StoreError::Driver { phase: Phase::Execute, .. })
    ));
    assert!(publisher.key().is_some());
    engine.rollback().await.unwrap();
    assert_eq!(engine.state(), EngineState::RolledBack);
    assert_eq!(publisher.key(), None);
    assert_eq!(clash.key(), Some(KeyValue::from(1i64)));
    let cache = engine.close().await.unwrap();
    assert!(cache.get("Publisher", &KeyValue::from(1i64)).is_none());
    assert!(cache.get("Book", &KeyValue::from(1i64)).is_some());

    let mut engine = Engine::with_cache(&mut conn, registry, cache).await.unwrap();
    clash.set("id", 2i64).unwrap();
    engine.insert(&clash).await.unwrap();
    engine.commit().await.unwrap();
    engine.close().await.unwrap();
    assert_eq!(count(&mut conn, "publisher").await, 1);
    assert_eq!(publisher.key(), Some(KeyValue::from(1i64)));
}

#[tokio::test]
async fn dropping_an_open_engine_clears_generated_keys() {
    let (mut conn, registry) = setup().await;
    let publisher = {
        let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
        let publisher = engine.create("Publisher").unwrap();
        engine.insert(&publisher).await.unwrap();
        publisher
    };
    assert_eq!(publisher.key(), None);
    assert_eq!(count(&mut conn, "publisher").await, 0);
}

#[tokio::test]
async fn unconvertible_row_ends_the_cursor() {
    let (mut conn, registry) = setup().await;
    sqlx::query(r#"INSERT INTO "tag" ("name", "weight") VALUES ('a', 1), ('b', 9999999999), ('c', 3)"#)
        .execute(&mut conn)
        .await
        .unwrap();
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    let mut rows = engine.fetch_all("Tag").unwrap();
    assert!(rows.advance().await.unwrap());
    assert_eq!(rows.current().unwrap().value("name").unwrap(), Some(Value::from("a")));
    assert!(matches!(rows.advance().await, Err(StoreError::Conversion { .. })));
    assert_eq!(rows.state(), CursorState::Exhausted);
    assert!(matches!(rows.current(), Err(StoreError::CursorExhausted)));
    assert!(!rows.advance().await.unwrap());
}

#[tokio::test]
async fn unknown_resources_are_reported() {
    let (mut conn, registry) = setup().await;
    let mut engine = Engine::begin(&mut conn, registry).await.unwrap();
    assert!(matches!(
        engine.fetch("Nope", 1).await,
        Err(StoreError::MetadataNotFound(name)) if name == "Nope"
    ));
}
