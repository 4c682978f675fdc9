//! Broker-driven transitions.
//!
//! Messages arrive on topics with at-least-once delivery. A static
//! [`TopicRoute`] table maps each topic to an event. Every message value is
//! an [`Envelope`], `{ "key": ..., "event": { ... } }`: `event` becomes the
//! payload and `key` (falling back to the message key) is the entity's
//! secondary key or urn.
//!
//! [`BrokerBridge::dispatch`] never raises. Every message ends in one
//! [`Disposition`], and workers acknowledge it afterwards, so a message is
//! only committed once it was applied, ignored, or dead-lettered.

mod bridge;
mod error;
mod memory;

pub use bridge::{BrokerBridge, DeadLetter};
pub use error::BrokerError;
pub use memory::MemoryBroker;

use crate::core::{Entity, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of every broker message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub event: Payload,
}

impl Envelope {
    /// Parse a message value; `event` must be a JSON object.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Envelope::deserialize(value)
    }
}

/// One delivery of a broker message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: usize,
    pub offset: u64,
    /// Secondary key of the target entity, or its urn when prefixed `urn:`
    pub key: String,
    /// An [`Envelope`]
    pub value: Value,
    /// Delivery attempt, starting at 1
    pub attempt: u32,
}

impl BrokerMessage {
    /// A message carrying `event` for `key` in an [`Envelope`].
    pub fn event(topic: impl Into<String>, key: impl Into<String>, event: Value) -> Self {
        let key = key.into();
        let value = serde_json::json!({ "key": key, "event": event });
        Self::new(topic, key, value)
    }

    pub fn new(topic: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key: key.into(),
            value,
            attempt: 1,
        }
    }
}

/// Static mapping from a topic to the event it carries.
#[derive(Clone, Debug)]
pub struct TopicRoute<E: Entity> {
    pub topic: String,
    pub event: E::Event,
}

impl<E: Entity> TopicRoute<E> {
    pub fn new(topic: impl Into<String>, event: E::Event) -> Self {
        Self {
            topic: topic.into(),
            event,
        }
    }
}

/// How a message was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// A transition was applied
    Applied,
    /// No transition matched, e.g. a redelivered duplicate
    Ignored,
    /// Unknown topic or no entity for the key
    Unroutable,
    /// Permanent failure or retry budget exhausted
    DeadLettered,
}
