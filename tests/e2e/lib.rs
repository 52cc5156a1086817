#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use kube::{Client, Config};
    use schema_listener::discovery::ClientDiscoveryFactory;
    use schema_listener::reconcile::SchemaReconciler;
    use schema_listener::schema::metadata::{ClusterMetadata, METADATA_EXTENSION};
    use schema_listener::store::memory::InMemoryStore;
    use schema_listener::store::{EventType, SchemaStore};
    use serde_json::Value;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    async fn reconcile_current_cluster(key: &str) -> (Arc<InMemoryStore>, SchemaReconciler) {
        let config = Config::infer().await.unwrap();
        // sanity check the cluster is reachable before going through discovery
        Client::try_from(config.clone())
            .unwrap()
            .apiserver_version()
            .await
            .unwrap();

        let store = Arc::new(InMemoryStore::new(64));
        let reconciler =
            SchemaReconciler::new(store.clone(), Arc::new(ClientDiscoveryFactory));
        let metadata = ClusterMetadata::new(config.cluster_url.to_string(), key.to_string());
        reconciler
            .reconcile(&[key.to_string()], &config, Some(&metadata))
            .await
            .unwrap();
        (store, reconciler)
    }

    #[tokio::test]
    async fn schema_contains_core_types() {
        let (store, _) = reconcile_current_cluster("e2e").await;

        let bytes = store.read("e2e").await.unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        let schemas = doc["components"]["schemas"].as_object().unwrap();

        assert!(schemas.contains_key("v1.Pod"));
        assert!(schemas.contains_key("apps.v1.Deployment"));
        assert_eq!(schemas["v1.Pod"]["x-kubernetes-scope"], "Namespaced");
        assert_eq!(schemas["v1.Namespace"]["x-kubernetes-scope"], "Cluster");
        assert!(doc[METADATA_EXTENSION]["host"].is_string());
    }

    #[tokio::test]
    async fn unchanged_reconcile_is_silent() {
        let (store, reconciler) = reconcile_current_cluster("e2e-idempotent").await;
        let first = store.read("e2e-idempotent").await.unwrap();

        let cancel = CancellationToken::new();
        let mut events = Box::pin(store.subscribe(cancel.clone()));
        // snapshot replay of the existing key
        let snapshot = timeout(Duration::from_secs(10), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.event_type, EventType::Added);

        let config = Config::infer().await.unwrap();
        let metadata =
            ClusterMetadata::new(config.cluster_url.to_string(), "e2e-idempotent".to_string());
        reconciler
            .reconcile(&["e2e-idempotent".to_string()], &config, Some(&metadata))
            .await
            .unwrap();

        assert_eq!(store.read("e2e-idempotent").await.unwrap(), first);
        cancel.cancel();
        // no further event was published for the unchanged write
        assert!(timeout(Duration::from_secs(10), events.next())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cleanup_publishes_removal() {
        let (store, reconciler) = reconcile_current_cluster("e2e-cleanup").await;

        let cancel = CancellationToken::new();
        let mut events = Box::pin(store.subscribe(cancel.clone()));
        let snapshot = timeout(Duration::from_secs(10), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.event_type, EventType::Added);

        reconciler
            .cleanup(&["e2e-cleanup".to_string()])
            .await
            .unwrap();

        let removed = timeout(Duration::from_secs(10), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.event_type, EventType::Removed);
        assert!(store.read("e2e-cleanup").await.unwrap_err().is_not_exist());
    }
}
