//! Definition rules for transition tables using Validation.

use crate::core::{Entity, Event, Status};
use crate::enforcement::context::DefinitionContext;
use crate::enforcement::violations::{ViolationError, ViolationStrategy};
use crate::table::Transition;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Checked = Validation<(), NonEmptyVec<ViolationError>>;

/// Type alias for custom definition checks.
pub type DefinitionCheck<E> = Box<dyn Fn(&DefinitionContext<'_, E>) -> Checked + Send + Sync>;

/// Rules a transition table must satisfy.
/// Uses Validation to accumulate ALL violations in one pass.
///
/// The standard rules are:
/// - final statuses have no outgoing transitions
/// - failed statuses are final
/// - the initial status is idle
/// - every transition has a non-empty from-set and event-set
pub struct DefinitionRules<E: Entity> {
    pub(crate) standard: bool,
    pub(crate) required_checks: Vec<DefinitionCheck<E>>,
    pub(crate) on_violation: ViolationStrategy,
}

impl<E: Entity> DefinitionRules<E> {
    /// Enforce all rules, accumulating every violation.
    pub fn enforce(&self, context: &DefinitionContext<'_, E>) -> Validation<(), NonEmptyVec<ViolationError>> {
        let mut checks: Vec<Checked> = Vec::new();

        if self.standard {
            checks.extend(standard_checks(context));
        }

        for check_fn in &self.required_checks {
            checks.push(check_fn(context));
        }

        Validation::all_vec(checks).map(|_| ())
    }

    pub fn violation_strategy(&self) -> ViolationStrategy {
        self.on_violation
    }
}

impl<E: Entity> Default for DefinitionRules<E> {
    fn default() -> Self {
        Self {
            standard: true,
            required_checks: Vec::new(),
            on_violation: ViolationStrategy::Reject,
        }
    }
}

fn standard_checks<E: Entity>(context: &DefinitionContext<'_, E>) -> Vec<Checked> {
    let mut checks = Vec::new();

    if context.initial.is_final() {
        checks.push(Validation::fail(ViolationError::FinalInitialStatus {
            status: context.initial.name().to_string(),
        }));
    }

    for status in context.statuses() {
        if status.is_failed() && !status.is_final() {
            checks.push(Validation::fail(ViolationError::FailedNotFinal {
                status: status.name().to_string(),
            }));
        }
    }

    for transition in context.transitions {
        if transition.from.is_empty() {
            checks.push(Validation::fail(ViolationError::EmptySet {
                to: transition.to.name().to_string(),
                set: "from",
            }));
        }
        if transition.events.is_empty() {
            checks.push(Validation::fail(ViolationError::EmptySet {
                to: transition.to.name().to_string(),
                set: "event",
            }));
        }
        for status in transition.from.iter().filter(|s| s.is_final()) {
            for event in &transition.events {
                checks.push(Validation::fail(ViolationError::TransitionFromFinal {
                    status: status.name().to_string(),
                    event: event.name().to_string(),
                }));
            }
        }
    }

    if checks.is_empty() {
        checks.push(Validation::success(()));
    }
    checks
}

/// Pairs `(earlier, later)` where an unguarded earlier transition covers
/// every `(from, event)` pair of the later one, so the later can never be
/// selected.
pub fn shadowed_transitions<E: Entity>(transitions: &[Transition<E>]) -> Vec<(usize, usize)> {
    let mut shadowed = Vec::new();
    for (later, candidate) in transitions.iter().enumerate() {
        let covering = transitions[..later].iter().position(|earlier| {
            !earlier.is_guarded()
                && candidate.from.iter().all(|s| earlier.from.contains(s))
                && candidate.events.iter().all(|e| earlier.events.contains(e))
        });
        if let Some(earlier) = covering {
            shadowed.push((earlier, later));
        }
    }
    shadowed
}
