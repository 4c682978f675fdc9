//! Results of an emit and the hooks around unmatched events.

use crate::core::{Entity, Payload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// What an emit did.
#[derive(Debug, Clone)]
pub enum Emission<E: Entity> {
    /// A transition matched; the entity was moved and persisted.
    Transitioned {
        entity: E,
        from: E::Status,
        to: E::Status,
    },
    /// No transition matched. The entity is whatever the fallback returned
    /// (unchanged when there is no fallback).
    Unmatched { entity: E },
}

impl<E: Entity> Emission<E> {
    pub fn entity(&self) -> &E {
        match self {
            Self::Transitioned { entity, .. } | Self::Unmatched { entity } => entity,
        }
    }

    pub fn into_entity(self) -> E {
        match self {
            Self::Transitioned { entity, .. } | Self::Unmatched { entity } => entity,
        }
    }

    pub fn is_transitioned(&self) -> bool {
        matches!(self, Self::Transitioned { .. })
    }

    pub fn status(&self) -> E::Status {
        self.entity().status()
    }
}

/// Handler invoked when an event matches no transition.
///
/// The returned entity is persisted only if its status differs from the
/// loaded one.
#[async_trait]
pub trait Fallback<E: Entity>: Send + Sync {
    async fn on_unmatched(&self, entity: E, event: &E::Event, payload: &Payload) -> E;
}

/// Fallback built from a synchronous closure.
pub struct FnFallback<E, F> {
    apply: F,
    _entity: PhantomData<fn(E) -> E>,
}

impl<E, F> FnFallback<E, F>
where
    E: Entity,
    F: Fn(E, &E::Event, &Payload) -> E + Send + Sync,
{
    pub fn new(apply: F) -> Self {
        Self {
            apply,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F> Fallback<E> for FnFallback<E, F>
where
    E: Entity,
    F: Fn(E, &E::Event, &Payload) -> E + Send + Sync,
{
    async fn on_unmatched(&self, entity: E, event: &E::Event, payload: &Payload) -> E {
        (self.apply)(entity, event, payload)
    }
}

/// Record of side effects that ran for an emit that was not committed.
///
/// Handlers that already performed external I/O cannot be rolled back;
/// these items tell an operator what to reconcile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub urn: String,
    pub event: String,
    /// Handlers and compensations that finished, in order
    pub completed_actions: Vec<String>,
    /// The handler that failed, if the failure was in a handler
    pub failed_action: Option<String>,
    pub error: String,
    pub at: DateTime<Utc>,
}
