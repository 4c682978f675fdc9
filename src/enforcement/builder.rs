//! Assembling the rule set a transition table is checked against.

use crate::core::Entity;
use crate::enforcement::context::DefinitionContext;
use crate::enforcement::rules::{DefinitionCheck, DefinitionRules};
use crate::enforcement::violations::{ViolationError, ViolationStrategy};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Collects table checks before [`TableBuilder::rules`](crate::table::TableBuilder::rules) runs them.
pub struct RulesBuilder<E: Entity> {
    standard: bool,
    required_checks: Vec<DefinitionCheck<E>>,
    on_violation: ViolationStrategy,
}

impl<E: Entity> RulesBuilder<E> {
    pub fn new() -> Self {
        Self {
            standard: true,
            required_checks: Vec::new(),
            on_violation: ViolationStrategy::Reject,
        }
    }

    /// Skip the standard rules and run only custom checks.
    pub fn without_standard_rules(mut self) -> Self {
        self.standard = false;
        self
    }

    /// Add a check that may report several violations at once.
    pub fn require<F>(mut self, check: F) -> Self
    where
        F: Fn(&DefinitionContext<'_, E>) -> Validation<(), NonEmptyVec<ViolationError>>
            + Send
            + Sync
            + 'static,
    {
        self.required_checks.push(Box::new(check));
        self
    }

    /// Add a yes/no check reported as `message` when it fails.
    pub fn require_pred<F>(mut self, predicate: F, message: String) -> Self
    where
        F: Fn(&DefinitionContext<'_, E>) -> bool + Send + Sync + 'static,
    {
        let check = move |ctx: &DefinitionContext<'_, E>| {
            if predicate(ctx) {
                Validation::success(())
            } else {
                Validation::fail(ViolationError::CustomCheckFailed {
                    message: message.clone(),
                })
            }
        };
        self.required_checks.push(Box::new(check));
        self
    }

    /// Reject the table, or only log, when a check fails.
    pub fn on_violation(mut self, strategy: ViolationStrategy) -> Self {
        self.on_violation = strategy;
        self
    }

    pub fn build(self) -> DefinitionRules<E> {
        DefinitionRules {
            standard: self.standard,
            required_checks: self.required_checks,
            on_violation: self.on_violation,
        }
    }
}

impl<E: Entity> Default for RulesBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
