use super::{EventType, SchemaEvent, SchemaStore, StoreError};
use crate::broadcast::Broadcaster;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// In-memory schema store with an attached event bus.
///
/// Every `write` emits an `Added` event and every `delete` a `Removed`
/// event. Subscribers receive the current snapshot first (as `Added` events
/// for every existing key), then live events. Events concurrent with
/// snapshot assembly may be observed via the snapshot, live, or both, so
/// subscribers must be idempotent on `Added` for identical bytes.
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
    bus: Broadcaster<SchemaEvent>,
}

impl InMemoryStore {
    pub fn new(buffer: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            bus: Broadcaster::new(buffer),
        }
    }

    /// Snapshot-then-live event stream, terminated by `cancel`.
    pub fn subscribe(&self, cancel: CancellationToken) -> impl Stream<Item = SchemaEvent> {
        // register for live events before assembling the snapshot so that
        // no write between the two is lost
        let live = self.bus.subscribe(cancel);
        let snapshot: Vec<SchemaEvent> = {
            let entries = self.entries.read();
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|key| SchemaEvent {
                    cluster_name: key.clone(),
                    schema: entries.get(key).cloned(),
                    event_type: EventType::Added,
                })
                .collect()
        };
        futures::stream::iter(snapshot).chain(live)
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}

#[async_trait]
impl SchemaStore for InMemoryStore {
    async fn read(&self, key: &str) -> Result<Bytes, StoreError> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotExist(key.to_string()))
    }

    async fn write(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        // publish under the write lock so events for one key stay ordered
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), bytes.clone());
        self.bus.publish(SchemaEvent {
            cluster_name: key.to_string(),
            schema: Some(bytes),
            event_type: EventType::Added,
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_none() {
            return Err(StoreError::NotExist(key.to_string()));
        }
        self.bus.publish(SchemaEvent {
            cluster_name: key.to_string(),
            schema: None,
            event_type: EventType::Removed,
        });
        Ok(())
    }
}
