//! Message transport collaborator
//!
//! The registry never stores message bytes itself. Whatever persists them is
//! handed in as a [`MessageTransport`]; the only contract is that each payload
//! is kept together with the schema version it was written with.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::topic::TopicName;

/// Position of a message within its topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A persisted message tagged with its writer schema version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub schema_version: u64,
    pub payload: Vec<u8>,
    pub published_at: DateTime<Utc>,
}

/// Persists payloads once their schema has been admitted
pub trait MessageTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn persist(
        &self,
        topic: &TopicName,
        schema_version: u64,
        payload: Vec<u8>,
    ) -> Result<MessageId, Self::Error>;
}

/// In-process transport keeping every topic's messages in order
#[derive(Debug, Default)]
pub struct MemoryTransport {
    topics: RwLock<HashMap<TopicName, Vec<StoredMessage>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of `topic` starting at `offset`, in publish order
    pub fn read_from(&self, topic: &TopicName, offset: u64) -> Vec<StoredMessage> {
        self.topics
            .read()
            .get(topic)
            .map(|messages| messages.iter().skip(offset as usize).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of messages stored for `topic`
    pub fn len(&self, topic: &TopicName) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, topic: &TopicName) -> bool {
        self.len(topic) == 0
    }
}

impl MessageTransport for MemoryTransport {
    type Error = Infallible;

    fn persist(
        &self,
        topic: &TopicName,
        schema_version: u64,
        payload: Vec<u8>,
    ) -> Result<MessageId, Infallible> {
        let mut topics = self.topics.write();
        let messages = topics.entry(topic.clone()).or_default();
        let id = MessageId(messages.len() as u64);
        messages.push(StoredMessage {
            id,
            schema_version,
            payload,
            published_at: Utc::now(),
        });
        Ok(id)
    }
}

impl<T: MessageTransport> MessageTransport for std::sync::Arc<T> {
    type Error = T::Error;

    fn persist(
        &self,
        topic: &TopicName,
        schema_version: u64,
        payload: Vec<u8>,
    ) -> Result<MessageId, Self::Error> {
        (**self).persist(topic, schema_version, payload)
    }
}
