//! Fluent builders for transitions and transition tables.

use super::error::BuildError;
use super::matching::TransitionTable;
use super::transition::Transition;
use crate::core::{Entity, Event, Guard, Payload, Status};
use crate::enforcement::{shadowed_transitions, DefinitionContext, DefinitionRules, ViolationStrategy};
use stillwater::validation::Validation;
use tracing::warn;

/// Builder for constructing a transition with a fluent API.
///
/// # Example
///
/// ```
/// use flowstate::domain::order::{Order, OrderEvent, OrderStatus};
/// use flowstate::table::TransitionBuilder;
///
/// let transition = TransitionBuilder::<Order>::new()
///     .from(OrderStatus::Shipped)
///     .on(OrderEvent::OutForDelivery)
///     .to(OrderStatus::OutForDelivery)
///     .build()
///     .unwrap();
///
/// assert!(transition.handles(&OrderStatus::Shipped, &OrderEvent::OutForDelivery));
/// ```
pub struct TransitionBuilder<E: Entity> {
    from: Vec<E::Status>,
    events: Vec<E::Event>,
    to: Option<E::Status>,
    guards: Vec<Guard<E>>,
}

impl<E: Entity> TransitionBuilder<E> {
    pub fn new() -> Self {
        Self {
            from: Vec::new(),
            events: Vec::new(),
            to: None,
            guards: Vec::new(),
        }
    }

    /// Add a source status (at least one required).
    pub fn from(mut self, status: E::Status) -> Self {
        if !self.from.contains(&status) {
            self.from.push(status);
        }
        self
    }

    /// Add several source statuses.
    pub fn from_any(self, statuses: impl IntoIterator<Item = E::Status>) -> Self {
        statuses
            .into_iter()
            .fold(self, |builder, status| builder.from(status))
    }

    /// Add a triggering event (at least one required).
    pub fn on(mut self, event: E::Event) -> Self {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        self
    }

    pub fn on_any(self, events: impl IntoIterator<Item = E::Event>) -> Self {
        events
            .into_iter()
            .fold(self, |builder, event| builder.on(event))
    }

    /// Set the target status (required).
    pub fn to(mut self, status: E::Status) -> Self {
        self.to = Some(status);
        self
    }

    /// Append a guard. Guards run in the order they are added.
    pub fn guard(mut self, guard: Guard<E>) -> Self {
        self.guards.push(guard);
        self
    }

    /// Append a guard using a closure over entity and payload.
    pub fn when<F>(self, label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&E, &Payload) -> bool + Send + Sync + 'static,
    {
        self.guard(Guard::new(label, predicate))
    }

    pub fn build(self) -> Result<Transition<E>, BuildError> {
        if self.from.is_empty() {
            return Err(BuildError::MissingFromStatus);
        }
        if self.events.is_empty() {
            return Err(BuildError::MissingEvent);
        }
        let to = self.to.ok_or(BuildError::MissingTargetStatus)?;

        Ok(Transition {
            from: self.from,
            events: self.events,
            to,
            guards: self.guards,
        })
    }
}

impl<E: Entity> Default for TransitionBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`TransitionTable`].
///
/// `build` checks the table against [`DefinitionRules`] (the standard rules
/// unless others are supplied) and warns about transitions that can never be
/// selected because an earlier unguarded rule covers the same pair.
pub struct TableBuilder<E: Entity> {
    initial: Option<E::Status>,
    transitions: Vec<Transition<E>>,
    rules: Option<DefinitionRules<E>>,
}

impl<E: Entity> TableBuilder<E> {
    pub fn new() -> Self {
        Self {
            initial: None,
            transitions: Vec::new(),
            rules: None,
        }
    }

    /// Set the initial status (required).
    pub fn initial(mut self, status: E::Status) -> Self {
        self.initial = Some(status);
        self
    }

    /// Add a transition using a builder.
    pub fn transition(mut self, builder: TransitionBuilder<E>) -> Result<Self, BuildError> {
        let transition = builder.build()?;
        self.transitions.push(transition);
        Ok(self)
    }

    /// Add a pre-built transition.
    pub fn add_transition(mut self, transition: Transition<E>) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn transitions(mut self, transitions: Vec<Transition<E>>) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Replace the definition rules used by `build`.
    pub fn rules(mut self, rules: DefinitionRules<E>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn build(self) -> Result<TransitionTable<E>, BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialStatus)?;

        if self.transitions.is_empty() {
            return Err(BuildError::NoTransitions);
        }

        let rules = self.rules.unwrap_or_default();
        let context = DefinitionContext {
            initial: &initial,
            transitions: &self.transitions,
        };

        if let Validation::Failure(errors) = rules.enforce(&context) {
            let violations: Vec<_> = errors.iter().cloned().collect();
            match rules.violation_strategy() {
                ViolationStrategy::Reject => {
                    return Err(BuildError::InvalidDefinition { violations });
                }
                ViolationStrategy::IgnoreAndLog => {
                    for violation in &violations {
                        warn!(%violation, "transition table violation ignored");
                    }
                }
            }
        }

        for (earlier, later) in shadowed_transitions(&self.transitions) {
            let shadowed = &self.transitions[later];
            warn!(
                earlier,
                later,
                to = shadowed.to.name(),
                events = ?shadowed.events.iter().map(|e| e.name()).collect::<Vec<_>>(),
                "transition is shadowed by an earlier unguarded transition"
            );
        }

        Ok(TransitionTable {
            initial,
            transitions: self.transitions,
        })
    }
}

impl<E: Entity> Default for TableBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
