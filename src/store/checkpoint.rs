//! Serializable snapshots of a store's contents.
//!
//! A checkpoint lets an in-memory store survive a process restart: take one
//! with [`MemoryStore::checkpoint`](super::MemoryStore::checkpoint), persist
//! the JSON or binary form, and feed it back to
//! [`MemoryStore::restore`](super::MemoryStore::restore).

use super::error::CheckpointError;
use crate::core::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Snapshot of every entity held by a store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Checkpoint<E: Entity> {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Entities sorted by urn
    pub entities: Vec<E>,
}

impl<E: Entity> Checkpoint<E> {
    pub fn new(mut entities: Vec<E>) -> Self {
        entities.sort_by(|a, b| a.urn().cmp(b.urn()));
        Self {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            entities,
        }
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Check version and urn uniqueness.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if entity.urn().is_empty() {
                return Err(CheckpointError::ValidationFailed(
                    "entity with empty urn".to_string(),
                ));
            }
            if !seen.insert(entity.urn()) {
                return Err(CheckpointError::ValidationFailed(format!(
                    "duplicate urn '{}'",
                    entity.urn()
                )));
            }
        }
        Ok(())
    }
}
