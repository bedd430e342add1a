use crate::error::SinkError;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Handle to a child created with `push_child`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub collection: String,
    pub key: String,
}

impl ChildRef {
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.key)
    }
}

/// Value written into a record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerValue {
    /// Resolved by the server to its own clock in epoch milliseconds
    ServerTimestamp,
    Text(String),
}

impl ServerValue {
    pub fn to_json(&self) -> Value {
        match self {
            ServerValue::ServerTimestamp => json!({ ".sv": "timestamp" }),
            ServerValue::Text(text) => Value::String(text.clone()),
        }
    }
}

/// Replicated key-value collection the upload stage writes to
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Number of records currently in the collection
    async fn child_count(&self) -> Result<usize, SinkError>;

    /// Remove every record in the collection
    async fn delete_all(&self) -> Result<(), SinkError>;

    /// Allocate a new record key
    async fn push_child(&self) -> Result<ChildRef, SinkError>;

    async fn set_field(
        &self,
        child: &ChildRef,
        name: &str,
        value: ServerValue,
    ) -> Result<(), SinkError>;

    fn name(&self) -> &str;
}
