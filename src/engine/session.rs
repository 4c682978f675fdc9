//! Exclusive multi-emit access to one entity.

use super::error::WorkflowError;
use super::locks::UrnGuard;
use super::outcome::Emission;
use super::workflow::WorkflowEngine;
use crate::core::{Entity, Payload};

/// Holds the urn lock so a caller can load and emit several times without
/// other emitters interleaving. Released on drop.
///
/// Each emit still runs on its own spawned task, so a started emit
/// completes even if the session owner stops polling.
pub struct EntitySession<E: Entity> {
    engine: WorkflowEngine<E>,
    urn: String,
    _guard: UrnGuard,
}

impl<E: Entity> EntitySession<E> {
    pub(crate) fn new(engine: WorkflowEngine<E>, urn: String, guard: UrnGuard) -> Self {
        Self {
            engine,
            urn,
            _guard: guard,
        }
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub fn engine(&self) -> &WorkflowEngine<E> {
        &self.engine
    }

    pub async fn load(&self) -> Result<E, WorkflowError> {
        self.engine.load(&self.urn).await
    }

    pub async fn emit(&self, event: E::Event, payload: Payload) -> Result<Emission<E>, WorkflowError> {
        self.engine
            .run_detached(self.urn.clone(), event, payload, None)
            .await
    }

    /// Dry-run match against the current persisted entity.
    pub async fn can_accept(&self, event: &E::Event, payload: &Payload) -> Result<bool, WorkflowError> {
        let entity = self.load().await?;
        Ok(self.engine.can_accept(&entity, event, payload))
    }
}
