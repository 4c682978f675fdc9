//! The transition table and first-match evaluation.

use super::transition::Transition;
use crate::core::{Entity, Event, Payload, Status};
use tracing::debug;

/// Ordered set of transition rules for one entity type.
///
/// Matching returns the first transition, in declaration order, whose
/// from-set contains the current status, whose event-set contains the
/// incoming event and whose guards all pass. When several transitions share
/// a `(from, event)` pair their guards should be mutually exclusive; if they
/// are not, declaration order decides.
pub struct TransitionTable<E: Entity> {
    pub(crate) initial: E::Status,
    pub(crate) transitions: Vec<Transition<E>>,
}

impl<E: Entity> TransitionTable<E> {
    /// Status new entities start in.
    pub fn initial(&self) -> &E::Status {
        &self.initial
    }

    pub fn transitions(&self) -> &[Transition<E>] {
        &self.transitions
    }

    /// Find the transition to apply, or `None` when the event is not valid
    /// for this status (including when every candidate's guards reject).
    pub fn match_transition(
        &self,
        status: &E::Status,
        event: &E::Event,
        entity: &E,
        payload: &Payload,
    ) -> Option<&Transition<E>> {
        let candidates = self.transitions.iter().filter(|t| t.handles(status, event));
        for transition in candidates {
            match transition.rejected_by(entity, payload) {
                None => return Some(transition),
                Some(guard) => debug!(
                    urn = entity.urn(),
                    status = status.name(),
                    event = event.name(),
                    to = transition.to.name(),
                    guard,
                    "guard rejected transition"
                ),
            }
        }
        None
    }

    /// Transitions structurally matching `(status, event)`, in declaration
    /// order, before guards are consulted.
    pub fn candidates<'a>(
        &'a self,
        status: &'a E::Status,
        event: &'a E::Event,
    ) -> impl Iterator<Item = &'a Transition<E>> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.handles(status, event))
    }

    /// True if any rule exists for `(status, event)`, ignoring guards.
    pub fn accepts(&self, status: &E::Status, event: &E::Event) -> bool {
        self.candidates(status, event).next().is_some()
    }

    pub fn transitions_from<'a>(
        &'a self,
        status: &'a E::Status,
    ) -> impl Iterator<Item = &'a Transition<E>> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.from.contains(status))
    }

    /// Distinct events with at least one rule leaving `status`.
    pub fn events_from(&self, status: &E::Status) -> Vec<E::Event> {
        let mut events: Vec<E::Event> = Vec::new();
        for transition in self.transitions_from(status) {
            for event in &transition.events {
                if !events.contains(event) {
                    events.push(event.clone());
                }
            }
        }
        events
    }

    /// Every status mentioned by the table, initial first.
    pub fn statuses(&self) -> Vec<E::Status> {
        let mut statuses = vec![self.initial.clone()];
        for transition in &self.transitions {
            for status in transition.from.iter().chain(std::iter::once(&transition.to)) {
                if !statuses.contains(status) {
                    statuses.push(status.clone());
                }
            }
        }
        statuses
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
