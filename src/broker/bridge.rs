//! Routing broker messages into workflow emits.

use super::memory::MemoryBroker;
use super::{BrokerMessage, Disposition, Envelope, TopicRoute};
use crate::config::BrokerConfig;
use crate::core::{Entity, Event, Payload};
use crate::engine::{Emission, WorkflowEngine, WorkflowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A message that could not be applied, kept for inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message: BrokerMessage,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Applies broker messages to a [`WorkflowEngine`].
///
/// Transient failures are redelivered in place with exponential backoff
/// until `max_deliveries` is reached. Emits on one urn are serialized by
/// the engine, so redeliveries and duplicates never interleave.
pub struct BrokerBridge<E: Entity> {
    engine: WorkflowEngine<E>,
    routes: HashMap<String, E::Event>,
    config: BrokerConfig,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

enum Delivery<E: Entity> {
    Emitted(Emission<E>),
    NoEntity,
}

impl<E: Entity> BrokerBridge<E> {
    pub fn new(
        engine: WorkflowEngine<E>,
        routes: impl IntoIterator<Item = TopicRoute<E>>,
        config: BrokerConfig,
    ) -> Self {
        let routes = routes
            .into_iter()
            .map(|route| (route.topic, route.event))
            .collect();
        Self {
            engine,
            routes,
            config,
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &WorkflowEngine<E> {
        &self.engine
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    /// Settle one message.
    pub async fn dispatch(&self, message: &BrokerMessage) -> Disposition {
        let Some(event) = self.routes.get(&message.topic) else {
            warn!(topic = %message.topic, key = %message.key, "no route for topic");
            return Disposition::Unroutable;
        };

        let Envelope { key, event: payload } = match Envelope::from_value(&message.value) {
            Ok(envelope) => envelope,
            Err(error) => {
                let reason = format!("message value is not a {{key, event}} envelope: {error}");
                return self.dead_letter(message, reason).await;
            }
        };
        let key = key.unwrap_or_else(|| message.key.clone());

        let mut attempt = message.attempt.max(1);
        loop {
            match self.deliver(&key, event, &payload).await {
                Ok(Delivery::Emitted(emission)) => {
                    return if emission.is_transitioned() {
                        debug!(topic = %message.topic, key = %message.key, attempt, "message applied");
                        Disposition::Applied
                    } else {
                        debug!(topic = %message.topic, key = %message.key, "no transition; message ignored");
                        Disposition::Ignored
                    };
                }
                Ok(Delivery::NoEntity) => {
                    warn!(topic = %message.topic, %key, "no entity for key");
                    return Disposition::Unroutable;
                }
                Err(error) if error.is_transient() && attempt < self.config.max_deliveries => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        topic = %message.topic,
                        key = %message.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient failure; redelivering"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    let reason = if error.is_transient() {
                        format!("gave up after {attempt} deliveries: {error}")
                    } else {
                        error.to_string()
                    };
                    return self.dead_letter(message, reason).await;
                }
            }
        }
    }

    /// Delay before redelivery number `attempt + 1`.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.config.backoff().saturating_mul(2u32.saturating_pow(exponent))
    }

    async fn deliver(
        &self,
        key: &str,
        event: &E::Event,
        payload: &Payload,
    ) -> Result<Delivery<E>, WorkflowError> {
        let urn = if key.starts_with("urn:") {
            key.to_string()
        } else {
            match self.engine.find_by_secondary_key(key).await? {
                Some(entity) => entity.urn().to_string(),
                None => return Ok(Delivery::NoEntity),
            }
        };
        let emission = self
            .engine
            .emit(&urn, event.clone(), payload.clone())
            .await?;
        Ok(Delivery::Emitted(emission))
    }

    async fn dead_letter(&self, message: &BrokerMessage, reason: String) -> Disposition {
        error!(
            topic = %message.topic,
            key = %message.key,
            partition = message.partition,
            offset = message.offset,
            error = %reason,
            "message dead-lettered"
        );
        self.dead_letters.lock().await.push(DeadLetter {
            message: message.clone(),
            error: reason,
            at: Utc::now(),
        });
        Disposition::DeadLettered
    }
}

impl<E: Entity> BrokerBridge<E> {
    /// Run one consumer per partition of `broker`. Each message is
    /// committed after it is settled. Workers stop when the broker is
    /// closed and drained, returning how many messages they settled.
    pub fn spawn_workers(self: Arc<Self>, broker: Arc<MemoryBroker>) -> Vec<JoinHandle<usize>> {
        (0..broker.partitions())
            .filter_map(|partition| match broker.take_partition(partition) {
                Ok(Some(receiver)) => Some((partition, receiver)),
                Ok(None) | Err(_) => {
                    warn!(partition, "partition already has a consumer");
                    None
                }
            })
            .map(|(partition, mut receiver)| {
                let bridge = Arc::clone(&self);
                let broker = Arc::clone(&broker);
                tokio::spawn(
                    async move {
                        let mut settled = 0;
                        while let Some(message) = receiver.recv().await {
                            let disposition = bridge.dispatch(&message).await;
                            debug!(
                                topic = %message.topic,
                                offset = message.offset,
                                ?disposition,
                                "message settled"
                            );
                            if let Err(error) = broker.commit(partition, message.offset) {
                                warn!(%error, "commit failed");
                            }
                            settled += 1;
                        }
                        info!(settled, "partition drained");
                        settled
                    }
                    .instrument(info_span!("broker_worker", partition)),
                )
            })
            .collect()
    }

    /// Names of the topics this bridge consumes.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    /// Event routed from `topic`, if any.
    pub fn route(&self, topic: &str) -> Option<&str> {
        self.routes.get(topic).map(|event| event.name())
    }
}
