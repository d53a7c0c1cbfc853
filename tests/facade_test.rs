//! Integration tests for the store facade: key management, expiry, registry
//! identity, sequences and pub/sub.

use chrono::Utc;
use kv_mcp_server::config::StoreSettings;
use kv_mcp_server::error::KvError;
use kv_mcp_server::facade::KvFacade;
use kv_mcp_server::store::{Connector, EntryType, MemoryStore, SetCondition};
use std::sync::Arc;
use std::time::Duration;

fn facade() -> Arc<KvFacade> {
    let facade = KvFacade::with_connector(
        Connector::Memory(MemoryStore::new()),
        &StoreSettings::memory(),
    )
    .unwrap();
    Arc::new(facade)
}

#[tokio::test]
async fn test_scalar_round_trip_and_conditions() {
    let facade = facade();
    assert_eq!(facade.get_value("greeting").await.unwrap(), None);

    assert!(!facade
        .set_value_with("greeting", "hi", None, SetCondition::Exists)
        .await
        .unwrap());
    assert!(facade
        .set_value_with("greeting", "hello", None, SetCondition::NotExists)
        .await
        .unwrap());
    assert!(!facade
        .set_value_with("greeting", "ignored", None, SetCondition::NotExists)
        .await
        .unwrap());

    let previous = facade.exchange_value("greeting", "hey").await.unwrap();
    assert_eq!(previous.as_deref(), Some("hello"));

    let values = facade
        .get_values(&["greeting".to_string(), "nope".to_string()])
        .await
        .unwrap();
    assert_eq!(values, vec![Some("hey".to_string()), None]);
}

#[tokio::test]
async fn test_counters_reject_bad_steps() {
    let facade = facade();
    assert_eq!(facade.increment("n", 5).await.unwrap(), 5);
    assert_eq!(facade.increment("n", -2).await.unwrap(), 3);
    assert_eq!(facade.decrement("n", 3).await.unwrap(), 0);

    assert!(matches!(
        facade.increment("n", 0).await,
        Err(KvError::InvalidArgument { .. })
    ));
    assert!(matches!(
        facade.decrement("n", -1).await,
        Err(KvError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_expiry() {
    let facade = facade();
    facade.set_value("session", "abc").await.unwrap();
    assert_eq!(facade.get_entry_expiry("session").await.unwrap(), None);

    assert!(facade
        .set_entry_expiry("session", Duration::from_secs(60))
        .await
        .unwrap());
    let ttl = facade.get_entry_expiry("session").await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(60));
    assert!(ttl > Duration::from_secs(50));

    let at = Utc::now() + chrono::Duration::minutes(10);
    assert!(facade.set_entry_expiry_at("session", at).await.unwrap());
    let ttl = facade.get_entry_expiry("session").await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(60));

    assert!(!facade
        .set_entry_expiry("missing", Duration::from_secs(5))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_find_rename_remove() {
    let facade = facade();
    for name in ["user:1", "user:2", "user:10", "order:1"] {
        facade.set_value(name, "x").await.unwrap();
    }

    let users = facade.find("user:*").await.unwrap();
    assert_eq!(users, vec!["user:1", "user:10", "user:2"]);
    assert_eq!(facade.find("user:?").await.unwrap().len(), 2);

    assert!(facade.rename("order:1", "order:one").await.unwrap());
    assert!(!facade.exists("order:1").await.unwrap());
    assert!(facade.exists("order:one").await.unwrap());

    let removed = facade
        .remove_many(&["user:1".to_string(), "user:2".to_string(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(facade.remove("user:10").await.unwrap());
    assert!(!facade.remove("user:10").await.unwrap());

    assert!(matches!(
        facade.find("  ").await,
        Err(KvError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_empty_names_rejected() {
    let facade = facade();
    assert!(matches!(
        facade.get_value("").await,
        Err(KvError::InvalidArgument { .. })
    ));
    assert!(matches!(
        facade.get_queue("").await,
        Err(KvError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_registry_returns_one_wrapper_per_name() {
    let facade = facade();
    let (a, b) = tokio::join!(facade.get_queue("jobs"), facade.get_queue("jobs"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));

    // A disposed wrapper is evicted; the next lookup builds a fresh one.
    a.dispose();
    assert!(matches!(a.count().await, Err(KvError::Disposed { .. })));
    let c = facade.get_queue("jobs").await.unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert!(!c.is_disposed());
}

#[tokio::test]
async fn test_clear_flushes_database_and_registry() {
    let facade = facade();
    let queue = facade.get_queue("jobs").await.unwrap();
    queue.enqueue("x").await.unwrap();

    facade.clear().await.unwrap();
    assert_eq!(facade.get_entry_type("jobs").await.unwrap(), EntryType::None);

    // Without a registered queue, the name is free for another type.
    let dictionary = facade.get_dictionary("jobs").await.unwrap();
    dictionary.set("f", "v").await.unwrap();
    assert_eq!(
        facade.get_entry_type("jobs").await.unwrap(),
        EntryType::Dictionary
    );
}

#[tokio::test]
async fn test_sequences() {
    let facade = facade();
    let sequences = facade.sequences();
    assert!(sequences.info("invoice").await.unwrap().is_none());

    assert_eq!(sequences.next("invoice").await.unwrap(), 1);
    assert_eq!(sequences.next("invoice").await.unwrap(), 2);

    sequences
        .reset("invoice", 41, 1, "INV-{year}-{#:D5}")
        .await
        .unwrap();
    sequences.reset("year", 2026, 1, "").await.unwrap();
    assert_eq!(
        sequences.next_string("invoice").await.unwrap(),
        "INV-2026-00042"
    );

    let info = sequences.info("invoice").await.unwrap().unwrap();
    assert_eq!(info.value, 42);
    assert_eq!(info.format_string, "INV-{year}-{#:D5}");

    assert!(matches!(
        sequences.next_with("invoice", 0, 0).await,
        Err(KvError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_publish_reaches_subscriber() {
    let facade = facade();
    let mut subscriber = facade
        .subscribe(vec!["alerts".to_string(), "news".to_string()])
        .await
        .unwrap();
    assert_eq!(subscriber.channels().len(), 2);

    assert_eq!(facade.publish("news", "extra").await.unwrap(), 1);
    assert_eq!(facade.publish("nobody", "hello").await.unwrap(), 0);

    let message = subscriber.recv().await.unwrap();
    assert_eq!(message.channel, "news");
    assert_eq!(message.payload, "extra");
}

#[tokio::test]
async fn test_dispose_stops_everything() {
    let facade = facade();
    let scalar = facade.get_scalar("k").await.unwrap();
    facade.dispose();

    assert!(matches!(
        facade.set_value("k", "v").await,
        Err(KvError::Disposed { .. })
    ));
    assert!(matches!(
        facade.publish("c", "m").await,
        Err(KvError::Disposed { .. })
    ));
    assert!(matches!(scalar.get().await, Err(KvError::PoolClosed)));
}
