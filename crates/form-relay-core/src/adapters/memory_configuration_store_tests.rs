//! Tests for the in-memory configuration store

use super::*;
use crate::configuration::ConfigurationRequest;
use crate::{ConfigKeyArity, Timestamp};
use serde_json::json;

fn configuration(location: &str, form: &str, object_type: &str, at: &str) -> FormConfiguration {
    let request: ConfigurationRequest = serde_json::from_value(json!({
        "locationId": location,
        "apiKey": "pit-123",
        "formId": form,
        "objectType": object_type
    }))
    .unwrap();

    request
        .into_configuration(
            ConfigKeyArity::LocationAndForm,
            Timestamp::from_rfc3339(at).unwrap(),
        )
        .unwrap()
}

#[tokio::test]
async fn test_put_get_delete() {
    let store = InMemoryConfigurationStore::new();
    let config = configuration("loc-1", "form-1", "custom_objects.leads", "2024-01-01T00:00:00Z");
    let key = config.key.clone();

    // Initially empty
    assert!(store.get(&key).await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 0);

    assert!(store.put(config).await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 1);

    let stored = store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.object_type, "custom_objects.leads");

    let removed = store.delete(&key).await.unwrap();
    assert!(removed.is_some());
    assert!(store.get(&key).await.unwrap().is_none());
    assert!(store.delete(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_overwrite_replaces_value_and_keeps_created_at() {
    let store = InMemoryConfigurationStore::new();
    let first = configuration("loc-1", "form-1", "custom_objects.leads", "2024-01-01T00:00:00Z");
    let second = configuration("loc-1", "form-1", "custom_objects.deals", "2024-02-01T00:00:00Z");
    let key = first.key.clone();

    store.put(first).await.unwrap();
    let previous = store.put(second).await.unwrap().unwrap();
    assert_eq!(previous.object_type, "custom_objects.leads");

    let stored = store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.object_type, "custom_objects.deals");
    assert_eq!(stored.created_at.to_rfc3339(), "2024-01-01T00:00:00.000Z");
    assert_eq!(stored.last_updated.to_rfc3339(), "2024-02-01T00:00:00.000Z");
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_lookup_is_exact_match() {
    let store = InMemoryConfigurationStore::new();
    store
        .put(configuration("loc-1", "form-1", "a", "2024-01-01T00:00:00Z"))
        .await
        .unwrap();

    let other_form = ConfigKey::new(
        ConfigKeyArity::LocationAndForm,
        LocationId::new("loc-1").unwrap(),
        Some(crate::FormId::new("form-2").unwrap()),
    )
    .unwrap();

    assert!(store.get(&other_form).await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_by_location_returns_oldest() {
    let store = InMemoryConfigurationStore::new();
    store
        .put(configuration("loc-1", "form-b", "second", "2024-02-01T00:00:00Z"))
        .await
        .unwrap();
    store
        .put(configuration("loc-1", "form-a", "first", "2024-01-01T00:00:00Z"))
        .await
        .unwrap();
    store
        .put(configuration("loc-2", "form-c", "elsewhere", "2023-01-01T00:00:00Z"))
        .await
        .unwrap();

    let location = LocationId::new("loc-1").unwrap();
    let found = store.find_by_location(&location).await.unwrap().unwrap();
    assert_eq!(found.object_type, "first");

    let unknown = LocationId::new("loc-9").unwrap();
    assert!(store.find_by_location(&unknown).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_writers_to_distinct_keys() {
    let store = InMemoryConfigurationStore::new();

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let config = configuration(
                "loc-1",
                &format!("form-{i}"),
                "custom_objects.leads",
                "2024-01-01T00:00:00Z",
            );
            store.put(config).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 20);
}
