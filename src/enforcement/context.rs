//! Context provided to definition checks.

use crate::core::Entity;
use crate::table::Transition;

/// The parts of a table under construction that checks inspect.
pub struct DefinitionContext<'a, E: Entity> {
    pub initial: &'a E::Status,
    pub transitions: &'a [Transition<E>],
}

impl<'a, E: Entity> DefinitionContext<'a, E> {
    /// Every status the definition mentions, initial first.
    pub fn statuses(&self) -> Vec<&'a E::Status> {
        let mut statuses = vec![self.initial];
        for transition in self.transitions {
            for status in transition.from.iter().chain(std::iter::once(&transition.to)) {
                if !statuses.contains(&status) {
                    statuses.push(status);
                }
            }
        }
        statuses
    }
}
