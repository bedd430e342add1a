use super::push_id::PushIdGenerator;
use super::record::LogRecord;
use super::sink::{ChildRef, RemoteSink, ServerValue};
use crate::config::SinkConfig;
use crate::error::SinkError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Realtime database reached through its REST interface
pub struct FirebaseSink {
    client: Client,
    base_url: String,
    collection: String,
    auth_token: Option<String>,
    push_ids: PushIdGenerator,
}

impl FirebaseSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SinkError::Transport {
                details: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.database_url.trim_end_matches('/').to_string(),
            collection: config.collection.trim_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            push_ids: PushIdGenerator::new(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}.json", self.base_url, path);
        trace!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.query(&[("auth", token.as_str())]),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Response, SinkError> {
        let response = builder.send().await.map_err(|e| SinkError::Transport {
            details: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json(response: Response) -> Result<Value, SinkError> {
        response.json::<Value>().await.map_err(|e| SinkError::Decode {
            details: e.to_string(),
        })
    }

    /// Every record in the collection, ordered by key
    pub async fn records(&self) -> Result<BTreeMap<String, LogRecord>, SinkError> {
        let response = Self::send(self.request(Method::GET, &self.collection)).await?;
        parse_records(Self::json(response).await?)
    }

    /// Newest record by key order, which is creation order for push keys
    pub async fn latest_record(&self) -> Result<Option<(String, LogRecord)>, SinkError> {
        let builder = self
            .request(Method::GET, &self.collection)
            .query(&[("orderBy", "\"$key\""), ("limitToLast", "1")]);
        let response = Self::send(builder).await?;
        let records = parse_records(Self::json(response).await?)?;
        Ok(records.into_iter().next_back())
    }
}

fn parse_records(value: Value) -> Result<BTreeMap<String, LogRecord>, SinkError> {
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(children) => children
            .into_iter()
            .map(|(key, child)| {
                serde_json::from_value::<LogRecord>(child)
                    .map(|record| (key.clone(), record))
                    .map_err(|e| SinkError::Decode {
                        details: format!("record {}: {}", key, e),
                    })
            })
            .collect(),
        other => Err(SinkError::Decode {
            details: format!("expected an object of records, got {}", other),
        }),
    }
}

#[async_trait]
impl RemoteSink for FirebaseSink {
    async fn child_count(&self) -> Result<usize, SinkError> {
        let builder = self
            .request(Method::GET, &self.collection)
            .query(&[("shallow", "true")]);
        let response = Self::send(builder).await?;

        match Self::json(response).await? {
            Value::Null => Ok(0),
            Value::Object(children) => Ok(children.len()),
            other => Err(SinkError::Decode {
                details: format!("collection is not an object: {}", other),
            }),
        }
    }

    async fn delete_all(&self) -> Result<(), SinkError> {
        Self::send(self.request(Method::DELETE, &self.collection)).await?;
        debug!("Deleted all records under {}", self.collection);
        Ok(())
    }

    async fn push_child(&self) -> Result<ChildRef, SinkError> {
        Ok(ChildRef {
            collection: self.collection.clone(),
            key: self.push_ids.next(),
        })
    }

    async fn set_field(
        &self,
        child: &ChildRef,
        name: &str,
        value: ServerValue,
    ) -> Result<(), SinkError> {
        let path = format!("{}/{}", child.path(), name);
        Self::send(self.request(Method::PUT, &path).json(&value.to_json())).await?;
        debug!("Set {} on {}", name, child.key);
        Ok(())
    }

    fn name(&self) -> &str {
        "firebase"
    }
}
