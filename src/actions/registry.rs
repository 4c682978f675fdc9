//! Explicit registry of action bindings.

use super::handler::{ActionHandler, Compensation};
use crate::core::{Entity, Event, Status};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a registered handler.
pub type SharedAction<E> = Arc<dyn ActionHandler<E>>;

/// Shared handle to a registered compensation.
pub type SharedCompensation<E> = Arc<dyn Compensation<E>>;

/// Maps events and status changes to ordered handlers.
///
/// Bindings are pure data assembled at startup; collaborators are injected
/// into the handlers themselves. Handlers run in registration order.
///
/// Compensations are kept in registration order and run newest first on
/// every event bound with [`compensate_on`](Self::compensate_on), before the
/// event's own handlers.
pub struct ActionRegistry<E: Entity> {
    on_event: HashMap<E::Event, Vec<SharedAction<E>>>,
    on_status_change: HashMap<(E::Status, E::Status), Vec<SharedAction<E>>>,
    compensations: Vec<SharedCompensation<E>>,
    compensating_events: Vec<E::Event>,
}

impl<E: Entity> ActionRegistry<E> {
    pub fn new() -> Self {
        Self {
            on_event: HashMap::new(),
            on_status_change: HashMap::new(),
            compensations: Vec::new(),
            compensating_events: Vec::new(),
        }
    }

    /// Bind a handler to an event. It fires whenever a transition on the
    /// event is applied, whatever the target status.
    pub fn on_event(mut self, event: E::Event, handler: impl ActionHandler<E> + 'static) -> Self {
        self.on_event
            .entry(event)
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Bind a handler to one specific status change.
    pub fn on_status_change(
        mut self,
        from: E::Status,
        to: E::Status,
        handler: impl ActionHandler<E> + 'static,
    ) -> Self {
        self.on_status_change
            .entry((from, to))
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Bind the same handler to several status changes.
    pub fn on_status_changes(
        mut self,
        changes: impl IntoIterator<Item = (E::Status, E::Status)>,
        handler: impl ActionHandler<E> + 'static,
    ) -> Self {
        let handler: SharedAction<E> = Arc::new(handler);
        for change in changes {
            self.on_status_change
                .entry(change)
                .or_default()
                .push(Arc::clone(&handler));
        }
        self
    }

    /// Register a compensation alongside its forward action.
    pub fn compensation(mut self, compensation: impl Compensation<E> + 'static) -> Self {
        self.compensations.push(Arc::new(compensation));
        self
    }

    /// Run applicable compensations whenever `event` is applied.
    pub fn compensate_on(mut self, event: E::Event) -> Self {
        if !self.compensating_events.contains(&event) {
            self.compensating_events.push(event);
        }
        self
    }

    pub fn event_handlers(&self, event: &E::Event) -> &[SharedAction<E>] {
        self.on_event.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn status_change_handlers(&self, from: &E::Status, to: &E::Status) -> &[SharedAction<E>] {
        self.on_status_change
            .get(&(from.clone(), to.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn compensates_on(&self, event: &E::Event) -> bool {
        self.compensating_events.contains(event)
    }

    /// Compensations whose forward effect is present, newest first.
    pub fn pending_compensations(&self, entity: &E) -> Vec<SharedCompensation<E>> {
        self.compensations
            .iter()
            .rev()
            .filter(|c| c.applies(entity))
            .cloned()
            .collect()
    }

    pub fn compensations(&self) -> &[SharedCompensation<E>] {
        &self.compensations
    }
}

impl<E: Entity> Default for ActionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for ActionRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<(&str, Vec<&str>)> = self
            .on_event
            .iter()
            .map(|(event, handlers)| (event.name(), handlers.iter().map(|h| h.name()).collect()))
            .collect();
        let changes: Vec<(&str, &str, Vec<&str>)> = self
            .on_status_change
            .iter()
            .map(|((from, to), handlers)| {
                (from.name(), to.name(), handlers.iter().map(|h| h.name()).collect())
            })
            .collect();
        f.debug_struct("ActionRegistry")
            .field("on_event", &events)
            .field("on_status_change", &changes)
            .field(
                "compensations",
                &self.compensations.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
