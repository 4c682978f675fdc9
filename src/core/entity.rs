//! The entity contract.

use super::history::StatusChange;
use super::state::{Event, Status};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A durable aggregate whose status is driven by a workflow.
///
/// The `urn` is globally unique and never changes after creation. Entities
/// are only mutated through [`WorkflowEngine::emit`]; between emits they are
/// owned by an [`EntityStore`].
///
/// [`WorkflowEngine::emit`]: crate::engine::WorkflowEngine::emit
/// [`EntityStore`]: crate::store::EntityStore
pub trait Entity:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: Status + 'static;
    type Event: Event + 'static;

    fn urn(&self) -> &str;

    fn status(&self) -> Self::Status;

    fn set_status(&mut self, status: Self::Status);

    /// Business key used by read models and broker routing (order number,
    /// SKU, email). Defaults to none.
    fn secondary_key(&self) -> Option<&str> {
        None
    }

    /// Called by the engine with every committed status change.
    fn record_change(&mut self, _change: StatusChange<Self::Status>) {}
}
