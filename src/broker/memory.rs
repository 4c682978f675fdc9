//! In-process partitioned broker.

use super::error::BrokerError;
use super::BrokerMessage;
use crate::config::BrokerConfig;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex as StdMutex, PoisonError};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

struct PartitionWriter {
    sender: Option<mpsc::Sender<BrokerMessage>>,
    next_offset: u64,
}

/// Partitioned topic log backed by bounded `mpsc` channels.
///
/// Messages with the same key always land on the same partition, so a
/// single consumer per partition sees them in publish order.
pub struct MemoryBroker {
    writers: Vec<Mutex<PartitionWriter>>,
    readers: StdMutex<Vec<Option<mpsc::Receiver<BrokerMessage>>>>,
    committed: StdMutex<Vec<Option<u64>>>,
}

impl MemoryBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        let partitions = config.partitions.max(1);
        let (writers, readers): (Vec<_>, Vec<_>) = (0..partitions)
            .map(|_| {
                let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
                let writer = Mutex::new(PartitionWriter {
                    sender: Some(sender),
                    next_offset: 0,
                });
                (writer, Some(receiver))
            })
            .unzip();
        Self {
            writers,
            readers: StdMutex::new(readers),
            committed: StdMutex::new(vec![None; partitions]),
        }
    }

    pub fn partitions(&self) -> usize {
        self.writers.len()
    }

    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.writers.len() as u64) as usize
    }

    /// Append `event` for `key`, wrapped in an [`Envelope`](super::Envelope), returning its
    /// partition and offset.
    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        event: Value,
    ) -> Result<(usize, u64), BrokerError> {
        let value = serde_json::json!({ "key": key, "event": event });
        let partition = self.partition_for(key);
        let mut writer = self.writers[partition].lock().await;
        let offset = writer.next_offset;
        let sender = writer.sender.as_ref().ok_or(BrokerError::Closed)?;

        let message = BrokerMessage {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.to_string(),
            value,
            attempt: 1,
        };
        sender.send(message).await.map_err(|_| BrokerError::Closed)?;
        writer.next_offset += 1;
        debug!(topic, key, partition, offset, "message published");
        Ok((partition, offset))
    }

    /// Hand out the consumer side of a partition. Each partition has one
    /// consumer; later calls return `None`.
    pub fn take_partition(
        &self,
        partition: usize,
    ) -> Result<Option<mpsc::Receiver<BrokerMessage>>, BrokerError> {
        let mut readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        readers
            .get_mut(partition)
            .map(Option::take)
            .ok_or(BrokerError::UnknownPartition { partition })
    }

    /// Acknowledge everything up to and including `offset`.
    pub fn commit(&self, partition: usize, offset: u64) -> Result<(), BrokerError> {
        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = committed
            .get_mut(partition)
            .ok_or(BrokerError::UnknownPartition { partition })?;
        *slot = Some(slot.map_or(offset, |current| current.max(offset)));
        Ok(())
    }

    pub fn committed_offset(&self, partition: usize) -> Option<u64> {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .copied()
            .flatten()
    }

    /// Stop accepting messages. Consumers drain what is buffered and then
    /// see their channel end.
    pub async fn close(&self) {
        for writer in &self.writers {
            writer.lock().await.sender = None;
        }
    }
}
