//! Entity persistence.
//!
//! The engine only talks to the [`EntityStore`] trait; [`MemoryStore`] is
//! the in-process adapter used by tests and demos. Checkpoints snapshot a
//! memory store to JSON or bincode.

mod checkpoint;
mod error;
mod memory;

pub use checkpoint::{Checkpoint, CHECKPOINT_VERSION};
pub use error::{CheckpointError, StoreError};
pub use memory::MemoryStore;

use crate::core::Entity;
use async_trait::async_trait;

/// Pluggable persistence for one entity type.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Build a fresh, unsaved entity with a new urn.
    fn create(&self) -> E;

    async fn load(&self, urn: &str) -> Result<E, StoreError>;

    /// Insert or replace by urn, returning the stored entity.
    async fn save(&self, entity: E) -> Result<E, StoreError>;

    async fn find_by_status(&self, status: &E::Status) -> Result<Vec<E>, StoreError>;

    async fn find_by_secondary_key(&self, key: &str) -> Result<Option<E>, StoreError>;

    async fn find_all(&self) -> Result<Vec<E>, StoreError>;
}
