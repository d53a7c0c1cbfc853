//! Tests that require a running Redis-compatible server.
//! Set TEST_REDIS_URL to run them, e.g.
//! TEST_REDIS_URL="redis://127.0.0.1:6379/15"
//!
//! Each test works under its own key prefix and removes what it created.

use kv_mcp_server::config::StoreSettings;
use kv_mcp_server::error::KvError;
use kv_mcp_server::facade::KvFacade;
use kv_mcp_server::store::EntryType;
use std::sync::Arc;
use std::time::Duration;

async fn connect() -> Option<Arc<KvFacade>> {
    let url = match std::env::var("TEST_REDIS_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_REDIS_URL not set");
            return None;
        }
    };
    let settings = StoreSettings::parse(&url).unwrap();
    Some(Arc::new(KvFacade::connect(&settings).await.unwrap()))
}

async fn cleanup(facade: &KvFacade, prefix: &str) {
    let keys = facade.find(&format!("{prefix}*")).await.unwrap();
    facade.remove_many(&keys).await.unwrap();
}

#[tokio::test]
async fn test_live_typed_entries() {
    let Some(facade) = connect().await else {
        return;
    };
    let prefix = "kvmcp:test:typed:";
    cleanup(&facade, prefix).await;

    let queue = facade.get_queue(&format!("{prefix}q")).await.unwrap();
    queue
        .enqueue_many(&["a".to_string(), "b".to_string(), "c".to_string()])
        .await
        .unwrap();
    assert_eq!(queue.dequeue_many(2).await.unwrap(), vec!["a", "b"]);

    let dictionary = facade.get_dictionary(&format!("{prefix}d")).await.unwrap();
    dictionary.set("f", "v").await.unwrap();
    assert_eq!(dictionary.increment("n", 3).await.unwrap(), 3);

    assert_eq!(
        facade.get_entry_type(&format!("{prefix}d")).await.unwrap(),
        EntryType::Dictionary
    );
    assert!(matches!(
        facade.get_hashset(&format!("{prefix}d")).await,
        Err(KvError::TypeMismatch { .. })
    ));

    cleanup(&facade, prefix).await;
}

#[tokio::test]
async fn test_live_expiry_and_publish() {
    let Some(facade) = connect().await else {
        return;
    };
    let prefix = "kvmcp:test:expiry:";
    cleanup(&facade, prefix).await;

    let key = format!("{prefix}k");
    facade.set_value(&key, "v").await.unwrap();
    assert!(facade
        .set_entry_expiry(&key, Duration::from_secs(30))
        .await
        .unwrap());
    let ttl = facade.get_entry_expiry(&key).await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(30));

    let channel = format!("{prefix}channel");
    let mut subscriber = facade.subscribe(vec![channel.clone()]).await.unwrap();
    assert_eq!(facade.publish(&channel, "ping").await.unwrap(), 1);
    let message = tokio::time::timeout(Duration::from_secs(5), subscriber.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.payload, "ping");

    cleanup(&facade, prefix).await;
}

#[tokio::test]
async fn test_live_pool_reuses_connections() {
    let Some(facade) = connect().await else {
        return;
    };
    for _ in 0..20 {
        facade.exists("kvmcp:test:pool").await.unwrap();
    }
    let stats = facade.pool_stats();
    assert_eq!(stats.leased, 0);
    assert!(stats.opened <= 2);
}
