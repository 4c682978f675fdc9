//! Action handlers and compensations.

use super::error::ActionError;
use crate::core::{Entity, Payload};
use async_trait::async_trait;
use std::marker::PhantomData;

/// A business action bound to an event or a status change.
///
/// Handlers receive the entity by value and return the updated entity.
/// They may change domain fields and perform I/O through injected
/// collaborators. The engine owns the status; a handler that changes it has
/// the change reverted.
#[async_trait]
pub trait ActionHandler<E: Entity>: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, entity: E, payload: &Payload) -> Result<E, ActionError>;
}

/// Undo for a forward action.
///
/// `applies` inspects the entity to decide whether the forward effect is
/// present (for example, a reservation is held). `compensate` removes it
/// and must leave the entity so that `applies` is false afterwards.
#[async_trait]
pub trait Compensation<E: Entity>: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the forward action this compensation undoes.
    fn forward(&self) -> &str;

    fn applies(&self, entity: &E) -> bool;

    async fn compensate(&self, entity: E, payload: &Payload) -> Result<E, ActionError>;
}

/// Synchronous handler built from a closure over `&mut E`.
///
/// # Example
///
/// ```rust
/// use flowstate::actions::{ActionHandler, FnAction};
/// use flowstate::core::Payload;
/// use flowstate::domain::order::Order;
///
/// let note = FnAction::new("note", |order: &mut Order, payload: &Payload| {
///     order.notes = payload.str("note").map(str::to_string);
///     Ok(())
/// });
/// assert_eq!(note.name(), "note");
/// ```
pub struct FnAction<E, F> {
    name: String,
    apply: F,
    _entity: PhantomData<fn(E) -> E>,
}

impl<E, F> FnAction<E, F>
where
    E: Entity,
    F: Fn(&mut E, &Payload) -> Result<(), ActionError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, apply: F) -> Self {
        Self {
            name: name.into(),
            apply,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F> ActionHandler<E> for FnAction<E, F>
where
    E: Entity,
    F: Fn(&mut E, &Payload) -> Result<(), ActionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, mut entity: E, payload: &Payload) -> Result<E, ActionError> {
        (self.apply)(&mut entity, payload)?;
        Ok(entity)
    }
}
