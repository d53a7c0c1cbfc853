//! Integration tests for the MCP tool handlers.

use kv_mcp_server::config::StoreSettings;
use kv_mcp_server::facade::KvFacade;
use kv_mcp_server::store::{Connector, EntryType, MemoryStore};
use kv_mcp_server::tools::{
    DictionarySetInput, DictionaryToolHandler, EntryToolHandler, GetInput, HashsetMembersInput,
    HashsetToolHandler, QueueEnqueueInput, QueueToolHandler, SetInput,
};
use std::sync::Arc;

fn facade() -> Arc<KvFacade> {
    let facade = KvFacade::with_connector(
        Connector::Memory(MemoryStore::new()),
        &StoreSettings::memory(),
    )
    .unwrap();
    Arc::new(facade)
}

#[tokio::test]
async fn test_get_reports_every_type() {
    let facade = facade();
    let entries = EntryToolHandler::new(facade.clone());

    let set: SetInput =
        serde_json::from_str(r#"{"name": "title", "value": "hello", "expiry_secs": 120}"#)
            .unwrap();
    entries.set(set).await.unwrap();

    let dictionary: DictionarySetInput =
        serde_json::from_str(r#"{"name": "user", "entries": {"name": "ada", "lang": "rust"}}"#)
            .unwrap();
    DictionaryToolHandler::new(facade.clone())
        .set(dictionary)
        .await
        .unwrap();

    HashsetToolHandler::new(facade.clone())
        .add(HashsetMembersInput {
            name: "tags".to_string(),
            members: vec!["b".to_string(), "a".to_string()],
        })
        .await
        .unwrap();

    QueueToolHandler::new(facade.clone())
        .enqueue(QueueEnqueueInput {
            name: "jobs".to_string(),
            values: vec!["first".to_string(), "second".to_string()],
        })
        .await
        .unwrap();

    let output = entries
        .get(GetInput {
            names: ["title", "user", "tags", "jobs", "missing"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
        .await
        .unwrap();

    let json = serde_json::to_value(&output).unwrap();
    let listed = json["entries"].as_array().unwrap();
    assert_eq!(listed.len(), 5);

    assert_eq!(listed[0]["entry_type"], "scalar");
    assert_eq!(listed[0]["value"], "hello");
    assert!(listed[0]["ttl_ms"].as_u64().unwrap() <= 120_000);

    assert_eq!(listed[1]["entry_type"], "dictionary");
    assert_eq!(listed[1]["value"]["lang"], "rust");

    assert_eq!(listed[2]["entry_type"], "set");
    assert_eq!(listed[2]["value"], serde_json::json!(["a", "b"]));

    assert_eq!(listed[3]["entry_type"], "list");
    assert_eq!(listed[3]["value"], serde_json::json!(["first", "second"]));

    assert_eq!(output.entries[4].entry_type, EntryType::None);
    assert!(listed[4]["value"].is_null());
    assert!(listed[4].get("ttl_ms").is_none());
}

#[tokio::test]
async fn test_type_mismatch_surfaces_through_tools() {
    let facade = facade();
    QueueToolHandler::new(facade.clone())
        .enqueue(QueueEnqueueInput {
            name: "jobs".to_string(),
            values: vec!["x".to_string()],
        })
        .await
        .unwrap();

    let err = HashsetToolHandler::new(facade)
        .add(HashsetMembersInput {
            name: "jobs".to_string(),
            members: vec!["m".to_string()],
        })
        .await
        .unwrap_err();
    let mcp: rmcp::ErrorData = err.into();
    assert!(mcp.message.contains("holds a list entry"));
}
