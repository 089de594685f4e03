//! Tests for concurrent writers on one document.

use super::*;
use crate::codec::read_document;
use crate::value::ValueCell;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_changes_all_land() {
    let manager = TestManager::start(&[("app1", APP1)]).await;
    let mut subscription = manager.subscribe(&["app1"]).await;
    let conn = Arc::new(manager.connect().await);

    let mut handles = Vec::new();
    for i in 0..20 {
        let conn = conn.clone();
        handles.push(tokio::spawn(async move {
            conn.change_configuration("app1", &format!("key{}", i), Some(ValueCell::Int(i)))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let config = conn.get_configuration("app1").await.unwrap();
    assert_eq!(config.len(), 22);
    for i in 0..20 {
        assert_eq!(config[&format!("key{}", i)], ValueCell::Int(i));
    }
    assert_eq!(read_document(&manager.file("app1")).unwrap(), config);

    // Broadcasts are full snapshots; the last one carries every key.
    let mut last = None;
    for _ in 0..20 {
        last = Some(next_event(&mut subscription).await);
    }
    match last {
        Some(SubscriptionEvent::ConfigurationChanged { config: latest, .. }) => {
            assert_eq!(latest, config)
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_during_writes_see_consistent_snapshots() {
    let manager = TestManager::start(&[("app1", APP1)]).await;
    let writer = manager.connect().await;
    let reader = manager.connect().await;

    let write_task = tokio::spawn(async move {
        for i in 0..20 {
            writer
                .change_configuration("app1", "Timeout", Some(ValueCell::Int(1000 + i)))
                .await
                .unwrap();
        }
    });

    for _ in 0..20 {
        let config = reader.get_configuration("app1").await.unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config["TimeoutPhrase"], ValueCell::from("hi"));
    }
    write_task.await.unwrap();

    assert_eq!(
        reader.get_configuration("app1").await.unwrap()["Timeout"],
        ValueCell::Int(1019)
    );
}
