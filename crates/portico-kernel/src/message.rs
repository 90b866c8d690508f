//! Messages and message flows of asynchronous APIs.

use crate::error::GatewayError;
use crate::headers::HttpHeaders;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Live, ordered, pull-based sequence of messages.
///
/// A flow is consumed once; it terminates on normal completion or after the
/// first `Err` item.  Polling drives the producer, so a slow consumer slows
/// the upstream down instead of buffering.
pub type MessageFlow = BoxStream<'static, Result<Message, GatewayError>>;

/// One message travelling through an asynchronous API.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub content: Bytes,
    pub headers: HttpHeaders,
    pub metadata: HashMap<String, Value>,
    /// Per-message attributes policies may read and write.
    pub attributes: HashMap<String, Value>,
}

impl Message {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            headers: HttpHeaders::new(),
            metadata: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Content decoded as UTF-8, lossily.
    pub fn content_str(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// JSON view exposed to expressions as `#message`.
    pub fn to_json(&self) -> Value {
        let metadata: Map<String, Value> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let attributes: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        json!({
            "id": self.id,
            "content": self.content_str(),
            "headers": self.headers.to_json(),
            "metadata": metadata,
            "attributes": attributes,
        })
    }
}
