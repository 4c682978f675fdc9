//! In-memory entity store.

use super::checkpoint::Checkpoint;
use super::error::{CheckpointError, StoreError};
use super::EntityStore;
use crate::core::Entity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

type Factory<E> = Arc<dyn Fn(String) -> E + Send + Sync>;

/// Process-wide store backed by a map keyed by urn.
///
/// Create one at startup and share it; contents only disappear through
/// [`clear`](Self::clear). New urns have the form `urn:<kind>:<uuid>`.
pub struct MemoryStore<E: Entity> {
    kind: String,
    factory: Factory<E>,
    entities: RwLock<HashMap<String, E>>,
    unavailable: AtomicBool,
}

impl<E: Entity> MemoryStore<E> {
    /// `factory` builds a fresh entity for a newly minted urn.
    pub fn new<F>(kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(String) -> E + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            factory: Arc::new(factory),
            entities: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Drop every entity. Intended for test setup.
    pub async fn clear(&self) {
        self.entities.write().await.clear();
        debug!(kind = %self.kind, "store cleared");
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Simulate an outage: while set, every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn checkpoint(&self) -> Checkpoint<E> {
        let entities = self.entities.read().await.values().cloned().collect();
        Checkpoint::new(entities)
    }

    /// Replace the store contents with a checkpoint's entities.
    pub async fn restore(&self, checkpoint: Checkpoint<E>) -> Result<usize, CheckpointError> {
        checkpoint.validate()?;
        let restored: HashMap<String, E> = checkpoint
            .entities
            .into_iter()
            .map(|entity| (entity.urn().to_string(), entity))
            .collect();
        let count = restored.len();
        *self.entities.write().await = restored;
        info!(kind = %self.kind, checkpoint = %checkpoint.id, count, "store restored");
        Ok(count)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable {
                reason: format!("{} store is offline", self.kind),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryStore<E> {
    fn create(&self) -> E {
        (self.factory)(format!("urn:{}:{}", self.kind, Uuid::new_v4()))
    }

    async fn load(&self, urn: &str) -> Result<E, StoreError> {
        self.ensure_available()?;
        self.entities
            .read()
            .await
            .get(urn)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                urn: urn.to_string(),
            })
    }

    async fn save(&self, entity: E) -> Result<E, StoreError> {
        self.ensure_available()?;
        self.entities
            .write()
            .await
            .insert(entity.urn().to_string(), entity.clone());
        Ok(entity)
    }

    async fn find_by_status(&self, status: &E::Status) -> Result<Vec<E>, StoreError> {
        self.ensure_available()?;
        let mut found: Vec<E> = self
            .entities
            .read()
            .await
            .values()
            .filter(|e| &e.status() == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.urn().cmp(b.urn()));
        Ok(found)
    }

    async fn find_by_secondary_key(&self, key: &str) -> Result<Option<E>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .entities
            .read()
            .await
            .values()
            .find(|e| e.secondary_key() == Some(key))
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<E>, StoreError> {
        self.ensure_available()?;
        let mut all: Vec<E> = self.entities.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.urn().cmp(b.urn()));
        Ok(all)
    }
}

impl<E: Entity> fmt::Debug for MemoryStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("kind", &self.kind)
            .field("unavailable", &self.unavailable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
