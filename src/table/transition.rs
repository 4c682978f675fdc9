//! Declarative transition rules.

use crate::core::{first_rejection, Entity, Guard, Payload};
use std::fmt;

/// A guarded move from a set of statuses to a target status, triggered by
/// any of a set of events.
///
/// Guards are evaluated in declaration order and ANDed; an empty guard list
/// always passes.
pub struct Transition<E: Entity> {
    pub from: Vec<E::Status>,
    pub events: Vec<E::Event>,
    pub to: E::Status,
    pub guards: Vec<Guard<E>>,
}

impl<E: Entity> Transition<E> {
    /// Structural match: `status` is in the from-set and `event` in the
    /// event-set. Guards are not consulted (pure).
    pub fn handles(&self, status: &E::Status, event: &E::Event) -> bool {
        self.from.contains(status) && self.events.contains(event)
    }

    /// Evaluate the guard list against an entity and payload (pure).
    pub fn permits(&self, entity: &E, payload: &Payload) -> bool {
        first_rejection(&self.guards, entity, payload).is_none()
    }

    /// Label of the first guard that rejects, if any.
    pub fn rejected_by(&self, entity: &E, payload: &Payload) -> Option<&str> {
        first_rejection(&self.guards, entity, payload)
    }

    pub fn is_guarded(&self) -> bool {
        !self.guards.is_empty()
    }
}

impl<E: Entity> Clone for Transition<E> {
    fn clone(&self) -> Self {
        Self {
            from: self.from.clone(),
            events: self.events.clone(),
            to: self.to.clone(),
            guards: self.guards.clone(),
        }
    }
}

impl<E: Entity> fmt::Debug for Transition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("events", &self.events)
            .field("to", &self.to)
            .field("guards", &self.guards)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Ticket, TicketEvent, TicketStatus};

    fn escalate() -> Transition<Ticket> {
        Transition {
            from: vec![TicketStatus::Open, TicketStatus::Triaged],
            events: vec![TicketEvent::Escalate],
            to: TicketStatus::Escalated,
            guards: vec![Guard::on_entity("high priority", |t: &Ticket| t.priority > 2)],
        }
    }

    #[test]
    fn handles_matches_from_set_and_event() {
        let transition = escalate();

        assert!(transition.handles(&TicketStatus::Open, &TicketEvent::Escalate));
        assert!(transition.handles(&TicketStatus::Triaged, &TicketEvent::Escalate));
        assert!(!transition.handles(&TicketStatus::Closed, &TicketEvent::Escalate));
        assert!(!transition.handles(&TicketStatus::Open, &TicketEvent::Close));
    }

    #[test]
    fn permits_respects_guards() {
        let transition = escalate();
        let urgent = Ticket::new("t-1").with_priority(3);
        let routine = Ticket::new("t-2").with_priority(1);

        assert!(transition.permits(&urgent, &Payload::new()));
        assert!(!transition.permits(&routine, &Payload::new()));
        assert_eq!(
            transition.rejected_by(&routine, &Payload::new()),
            Some("high priority")
        );
    }

    #[test]
    fn unguarded_transition_always_permits() {
        let transition: Transition<Ticket> = Transition {
            from: vec![TicketStatus::Open],
            events: vec![TicketEvent::Close],
            to: TicketStatus::Closed,
            guards: Vec::new(),
        };
        assert!(!transition.is_guarded());
        assert!(transition.permits(&Ticket::new("t-3"), &Payload::new()));
    }
}
