pub mod fs;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Store failures, with absence distinguished from I/O failure.
///
/// Callers branch on `NotExist` to drive diff-and-write and cleanup logic;
/// it is never treated as an error worth logging.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("schema {0:?} does not exist")]
    NotExist(String),

    #[error("invalid schema key {0:?}")]
    InvalidKey(String),

    #[error("store i/o failure: {0}")]
    Io(#[source] std::io::Error),
}

impl StoreError {
    pub fn is_not_exist(&self) -> bool {
        matches!(self, StoreError::NotExist(_))
    }
}

/// Keyed byte store holding the latest schema document per cluster key.
///
/// Keys may contain `/` to indicate hierarchy. `write` creates or replaces;
/// only the latest document per key is retained.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Bytes, StoreError>;
    async fn write(&self, key: &str, bytes: Bytes) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EventType {
    #[serde(rename = "ADDED")]
    Added,
    #[serde(rename = "REMOVED")]
    Removed,
}

/// Change notification emitted by the event-bus store flavor
#[derive(Clone, Debug)]
pub struct SchemaEvent {
    pub cluster_name: String,
    pub schema: Option<Bytes>,
    pub event_type: EventType,
}

impl SchemaEvent {
    /// Wire shape streamed to subscribers, one JSON document per line
    pub fn to_ndjson(&self) -> Bytes {
        let schema = self
            .schema
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        let value = serde_json::json!({
            "clusterName": self.cluster_name,
            "schema": schema,
            "eventType": self.event_type,
        });
        // safe unwrap: the value is built from strings only
        let mut line = serde_json::to_vec(&value).unwrap();
        line.push(b'\n');
        Bytes::from(line)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = SchemaEvent {
            cluster_name: "root:orgs".to_string(),
            schema: Some(Bytes::from_static(b"{}")),
            event_type: EventType::Added,
        };
        let line = event.to_ndjson();
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["clusterName"], "root:orgs");
        assert_eq!(value["schema"], "{}");
        assert_eq!(value["eventType"], "ADDED");
        assert!(line.ends_with(b"\n"));
    }

    #[test]
    fn test_removed_event_has_empty_schema() {
        let event = SchemaEvent {
            cluster_name: "vw/a".to_string(),
            schema: None,
            event_type: EventType::Removed,
        };
        let value: serde_json::Value = serde_json::from_slice(&event.to_ndjson()).unwrap();
        assert_eq!(value["schema"], "");
        assert_eq!(value["eventType"], "REMOVED");
    }
}
