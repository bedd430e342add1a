use super::push_id::PushIdGenerator;
use super::record::LogRecord;
use super::sink::{ChildRef, RemoteSink, ServerValue};
use crate::error::SinkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

/// Operation recorded by `MemorySink`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    ChildCount,
    DeleteAll,
    PushChild { key: String },
    SetField { key: String, name: String },
}

/// Sink operation a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    ChildCount,
    DeleteAll,
    PushChild,
    SetField,
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<String, Map<String, Value>>,
    journal: Vec<SinkOp>,
    failures: Vec<(FailPoint, SinkError)>,
    delay: Duration,
}

/// In-process sink with an operation journal
#[derive(Clone)]
pub struct MemorySink {
    collection: String,
    state: Arc<Mutex<MemoryState>>,
    push_ids: Arc<PushIdGenerator>,
    gate: Arc<RwLock<()>>,
}

impl MemorySink {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
            push_ids: Arc::new(PushIdGenerator::new()),
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Seed `count` pre-existing records
    pub fn with_records(self, count: usize) -> Self {
        {
            let mut state = self.state.lock();
            for n in 0..count {
                let key = self.push_ids.next_at(n as i64);
                let mut fields = Map::new();
                fields.insert("timestamp".to_string(), Value::from(n as i64));
                fields.insert("image".to_string(), Value::from("AA=="));
                state.records.insert(key, fields);
            }
        }
        self
    }

    /// Every operation waits this long before taking effect
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().delay = delay;
        self
    }

    /// Fail the next call at `point` with `error`
    pub fn fail_next(&self, point: FailPoint, error: SinkError) {
        self.state.lock().failures.push((point, error));
    }

    /// Block every operation until the returned guard is dropped
    pub async fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.gate).write_owned().await
    }

    pub fn journal(&self) -> Vec<SinkOp> {
        self.state.lock().journal.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the collection, ordered by key
    pub fn records(&self) -> Vec<(String, LogRecord)> {
        self.state
            .lock()
            .records
            .iter()
            .map(|(key, fields)| {
                let record = serde_json::from_value(Value::Object(fields.clone()))
                    .unwrap_or_default();
                (key.clone(), record)
            })
            .collect()
    }

    /// Field names of one record in the order they were written
    pub fn field_order(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .filter_map(|op| match op {
                SinkOp::SetField { key: k, name } if k == key => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, point: FailPoint) -> Result<(), SinkError> {
        let _gate = self.gate.read().await;
        let delay = self.state.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        match state.failures.iter().position(|(p, _)| *p == point) {
            Some(index) => Err(state.failures.remove(index).1),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteSink for MemorySink {
    async fn child_count(&self) -> Result<usize, SinkError> {
        self.enter(FailPoint::ChildCount).await?;
        let mut state = self.state.lock();
        state.journal.push(SinkOp::ChildCount);
        Ok(state.records.len())
    }

    async fn delete_all(&self) -> Result<(), SinkError> {
        self.enter(FailPoint::DeleteAll).await?;
        let mut state = self.state.lock();
        state.journal.push(SinkOp::DeleteAll);
        state.records.clear();
        Ok(())
    }

    async fn push_child(&self) -> Result<ChildRef, SinkError> {
        self.enter(FailPoint::PushChild).await?;
        let key = self.push_ids.next();
        let mut state = self.state.lock();
        state.journal.push(SinkOp::PushChild { key: key.clone() });
        state.records.insert(key.clone(), Map::new());
        Ok(ChildRef {
            collection: self.collection.clone(),
            key,
        })
    }

    async fn set_field(
        &self,
        child: &ChildRef,
        name: &str,
        value: ServerValue,
    ) -> Result<(), SinkError> {
        self.enter(FailPoint::SetField).await?;
        let resolved = match value {
            ServerValue::ServerTimestamp => Value::from(chrono::Utc::now().timestamp_millis()),
            other => other.to_json(),
        };

        let mut state = self.state.lock();
        state.journal.push(SinkOp::SetField {
            key: child.key.clone(),
            name: name.to_string(),
        });
        state
            .records
            .entry(child.key.clone())
            .or_default()
            .insert(name.to_string(), resolved);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
