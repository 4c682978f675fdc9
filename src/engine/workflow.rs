//! The emit pipeline.

use super::error::WorkflowError;
use super::locks::{UrnGuard, UrnLocks};
use super::outcome::{Emission, Fallback, FnFallback, ReconciliationItem};
use super::session::EntitySession;
use crate::actions::{ActionError, ActionRegistry};
use crate::config::EngineConfig;
use crate::core::{Entity, Event, Payload, Status, StatusChange};
use crate::store::EntityStore;
use crate::table::TransitionTable;
use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

struct EngineInner<E: Entity> {
    table: TransitionTable<E>,
    actions: ActionRegistry<E>,
    store: Arc<dyn EntityStore<E>>,
    fallback: Option<Arc<dyn Fallback<E>>>,
    config: EngineConfig,
    locks: UrnLocks,
    reconciliation: Mutex<Vec<ReconciliationItem>>,
}

/// Applies events to stored entities.
///
/// `WorkflowEngine` is a cheap handle; clones share the table, registry,
/// store and urn locks. Emits on the same urn are serialized, emits on
/// different urns run in parallel.
///
/// # Example
///
/// ```rust
/// use flowstate::actions::ActionRegistry;
/// use flowstate::core::Payload;
/// use flowstate::domain::order::{order_table, Order, OrderEvent, OrderStatus};
/// use flowstate::engine::WorkflowEngine;
/// use flowstate::store::MemoryStore;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = Arc::new(MemoryStore::new("order", Order::new));
/// let engine = WorkflowEngine::builder(order_table().unwrap(), store)
///     .actions(ActionRegistry::new())
///     .build();
///
/// let order = engine.create(|_| {}).await.unwrap();
/// let emission = engine
///     .emit(&order.urn, OrderEvent::InitiatePayment, Payload::new())
///     .await
///     .unwrap();
/// assert_eq!(emission.status(), OrderStatus::PaymentPending);
/// # }
/// ```
pub struct WorkflowEngine<E: Entity> {
    inner: Arc<EngineInner<E>>,
}

impl<E: Entity> Clone for WorkflowEngine<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> fmt::Debug for WorkflowEngine<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("transitions", &self.inner.table.len())
            .field("actions", &self.inner.actions)
            .field("fallback", &self.inner.fallback.is_some())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for a [`WorkflowEngine`].
pub struct WorkflowEngineBuilder<E: Entity> {
    table: TransitionTable<E>,
    store: Arc<dyn EntityStore<E>>,
    actions: ActionRegistry<E>,
    fallback: Option<Arc<dyn Fallback<E>>>,
    config: EngineConfig,
}

impl<E: Entity> WorkflowEngineBuilder<E> {
    pub fn actions(mut self, actions: ActionRegistry<E>) -> Self {
        self.actions = actions;
        self
    }

    pub fn fallback(mut self, fallback: impl Fallback<E> + 'static) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Fallback from a closure.
    pub fn fallback_fn<F>(self, apply: F) -> Self
    where
        F: Fn(E, &E::Event, &Payload) -> E + Send + Sync + 'static,
    {
        self.fallback(FnFallback::new(apply))
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> WorkflowEngine<E> {
        WorkflowEngine {
            inner: Arc::new(EngineInner {
                table: self.table,
                actions: self.actions,
                store: self.store,
                fallback: self.fallback,
                config: self.config,
                locks: UrnLocks::new(),
                reconciliation: Mutex::new(Vec::new()),
            }),
        }
    }
}

fn validate_urn(urn: &str) -> Result<&str, WorkflowError> {
    if urn.trim().is_empty() {
        Err(WorkflowError::InvalidUrn)
    } else {
        Ok(urn)
    }
}

fn keep_status<E: Entity>(entity: &mut E, expected: &E::Status, action: &str) {
    let actual = entity.status();
    if &actual != expected {
        warn!(
            urn = entity.urn(),
            action,
            expected = expected.name(),
            actual = actual.name(),
            "action changed status; change discarded"
        );
        entity.set_status(expected.clone());
    }
}

impl<E: Entity> WorkflowEngine<E> {
    pub fn builder<S>(table: TransitionTable<E>, store: Arc<S>) -> WorkflowEngineBuilder<E>
    where
        S: EntityStore<E> + 'static,
    {
        WorkflowEngineBuilder {
            table,
            store,
            actions: ActionRegistry::new(),
            fallback: None,
            config: EngineConfig::default(),
        }
    }

    pub fn table(&self) -> &TransitionTable<E> {
        &self.inner.table
    }

    pub fn store(&self) -> &Arc<dyn EntityStore<E>> {
        &self.inner.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Create and persist a new entity in the table's initial status.
    ///
    /// `init` sets domain fields; any status it sets is overwritten.
    pub async fn create<F>(&self, init: F) -> Result<E, WorkflowError>
    where
        F: FnOnce(&mut E),
    {
        let mut entity = self.inner.store.create();
        init(&mut entity);
        entity.set_status(self.inner.table.initial().clone());
        let urn = entity.urn().to_string();
        let saved = self
            .inner
            .store
            .save(entity)
            .await
            .map_err(|e| WorkflowError::from_store(&urn, e))?;
        info!(urn = %urn, status = saved.status().name(), "entity created");
        Ok(saved)
    }

    pub async fn load(&self, urn: &str) -> Result<E, WorkflowError> {
        let urn = validate_urn(urn)?;
        self.inner
            .store
            .load(urn)
            .await
            .map_err(|e| WorkflowError::from_store(urn, e))
    }

    pub async fn find_by_status(&self, status: &E::Status) -> Result<Vec<E>, WorkflowError> {
        self.inner
            .store
            .find_by_status(status)
            .await
            .map_err(|e| WorkflowError::from_store(status.name(), e))
    }

    pub async fn find_by_secondary_key(&self, key: &str) -> Result<Option<E>, WorkflowError> {
        self.inner
            .store
            .find_by_secondary_key(key)
            .await
            .map_err(|e| WorkflowError::from_store(key, e))
    }

    /// Whether `event` would apply a transition to `entity` right now.
    /// Runs guards but no actions.
    pub fn can_accept(&self, entity: &E, event: &E::Event, payload: &Payload) -> bool {
        self.inner
            .table
            .match_transition(&entity.status(), event, entity, payload)
            .is_some()
    }

    /// Apply `event` to the entity stored under `urn`.
    ///
    /// Waiting for the urn lock can be cancelled by dropping the future.
    /// Once the lock is held the emit runs on its own task and finishes
    /// even if the caller goes away.
    pub async fn emit(
        &self,
        urn: &str,
        event: E::Event,
        payload: Payload,
    ) -> Result<Emission<E>, WorkflowError> {
        let urn = validate_urn(urn)?;
        let guard = self.inner.locks.acquire(urn).await;
        self.run_detached(urn.to_string(), event, payload, Some(guard))
            .await
    }

    /// Take exclusive access to `urn` for several emits.
    pub async fn session(&self, urn: &str) -> Result<EntitySession<E>, WorkflowError> {
        let urn = validate_urn(urn)?;
        let guard = self.inner.locks.acquire(urn).await;
        Ok(EntitySession::new(self.clone(), urn.to_string(), guard))
    }

    /// Side effects of failed emits awaiting manual reconciliation.
    pub async fn reconciliation_items(&self) -> Vec<ReconciliationItem> {
        self.inner.reconciliation.lock().await.clone()
    }

    pub(crate) async fn run_detached(
        &self,
        urn: String,
        event: E::Event,
        payload: Payload,
        guard: Option<UrnGuard>,
    ) -> Result<Emission<E>, WorkflowError> {
        let engine = self.clone();
        let span = info_span!("emit", urn = %urn, event = event.name());
        let task_urn = urn.clone();
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                engine.apply(&task_urn, event, payload).await
            }
            .instrument(span),
        );
        handle.await.map_err(|e| WorkflowError::Aborted {
            urn,
            reason: e.to_string(),
        })?
    }

    async fn apply(
        &self,
        urn: &str,
        event: E::Event,
        payload: Payload,
    ) -> Result<Emission<E>, WorkflowError> {
        let inner = &self.inner;
        let entity = inner
            .store
            .load(urn)
            .await
            .map_err(|e| WorkflowError::from_store(urn, e))?;
        let from = entity.status();

        let to = match inner.table.match_transition(&from, &event, &entity, &payload) {
            Some(transition) => transition.to.clone(),
            None => return self.unmatched(entity, &event, &payload).await,
        };

        let mut completed = Vec::new();
        let mut working = entity;

        if inner.actions.compensates_on(&event) {
            for compensation in inner.actions.pending_compensations(&working) {
                let name = compensation.name();
                working = match self.bounded(name, compensation.compensate(working, &payload)).await {
                    Ok(next) => next,
                    Err(error) => return Err(self.abort(urn, &event, completed, name, error).await),
                };
                keep_status(&mut working, &from, name);
                completed.push(name.to_string());
            }
        }

        for handler in inner.actions.event_handlers(&event) {
            let name = handler.name();
            working = match self.bounded(name, handler.handle(working, &payload)).await {
                Ok(next) => next,
                Err(error) => return Err(self.abort(urn, &event, completed, name, error).await),
            };
            keep_status(&mut working, &from, name);
            completed.push(name.to_string());
        }

        working.set_status(to.clone());
        working.record_change(StatusChange::new(from.clone(), to.clone(), event.name()));

        for handler in inner.actions.status_change_handlers(&from, &to) {
            let name = handler.name();
            working = match self.bounded(name, handler.handle(working, &payload)).await {
                Ok(next) => next,
                Err(error) => return Err(self.abort(urn, &event, completed, name, error).await),
            };
            keep_status(&mut working, &to, name);
            completed.push(name.to_string());
        }

        let saved = match inner.store.save(working).await {
            Ok(saved) => saved,
            Err(source) => {
                if !completed.is_empty() {
                    self.record(ReconciliationItem {
                        urn: urn.to_string(),
                        event: event.name().to_string(),
                        completed_actions: completed,
                        failed_action: None,
                        error: source.to_string(),
                        at: Utc::now(),
                    })
                    .await;
                }
                return Err(WorkflowError::PersistenceFailed {
                    urn: urn.to_string(),
                    source,
                });
            }
        };

        info!(
            from = from.name(),
            to = to.name(),
            actions = completed.len(),
            "transition applied"
        );
        Ok(Emission::Transitioned {
            entity: saved,
            from,
            to,
        })
    }

    async fn unmatched(
        &self,
        entity: E,
        event: &E::Event,
        payload: &Payload,
    ) -> Result<Emission<E>, WorkflowError> {
        let before = entity.status();
        debug!(status = before.name(), "no matching transition");

        let Some(fallback) = &self.inner.fallback else {
            return Ok(Emission::Unmatched { entity });
        };

        let mut result = fallback.on_unmatched(entity, event, payload).await;
        let after = result.status();
        if after == before {
            return Ok(Emission::Unmatched { entity: result });
        }

        result.record_change(StatusChange::new(before.clone(), after.clone(), event.name()));
        let urn = result.urn().to_string();
        let saved = self
            .inner
            .store
            .save(result)
            .await
            .map_err(|e| WorkflowError::from_store(&urn, e))?;
        info!(
            from = before.name(),
            to = after.name(),
            "fallback changed status"
        );
        Ok(Emission::Unmatched { entity: saved })
    }

    async fn bounded<F>(&self, action: &str, call: F) -> Result<E, ActionError>
    where
        F: Future<Output = Result<E, ActionError>>,
    {
        let timeout = self.inner.config.action_timeout();
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(ActionError::TimedOut {
                    action: action.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            })
    }

    async fn abort(
        &self,
        urn: &str,
        event: &E::Event,
        completed: Vec<String>,
        action: &str,
        error: ActionError,
    ) -> WorkflowError {
        self.record(ReconciliationItem {
            urn: urn.to_string(),
            event: event.name().to_string(),
            completed_actions: completed,
            failed_action: Some(action.to_string()),
            error: error.to_string(),
            at: Utc::now(),
        })
        .await;
        WorkflowError::ActionFailed {
            urn: urn.to_string(),
            event: event.name().to_string(),
            action: action.to_string(),
            source: error,
        }
    }

    async fn record(&self, item: ReconciliationItem) {
        warn!(
            urn = %item.urn,
            event = %item.event,
            completed = ?item.completed_actions,
            failed = ?item.failed_action,
            error = %item.error,
            "emit not committed; reconciliation item recorded"
        );
        self.inner.reconciliation.lock().await.push(item);
    }
}
