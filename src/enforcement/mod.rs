//! Validation-based enforcement for workflow definitions and collaborator
//! calls.
//!
//! Transition tables are checked with Stillwater's `Validation` type so that
//! every violation in a definition is reported in a single pass instead of
//! stopping at the first one.
//!
//! # Example
//!
//! ```rust
//! use flowstate::domain::order::Order;
//! use flowstate::enforcement::{DefinitionRules, RulesBuilder, ViolationStrategy};
//!
//! let rules: DefinitionRules<Order> = RulesBuilder::<Order>::new()
//!     .require_pred(|ctx| ctx.transitions.len() < 64, "table too large".to_string())
//!     .on_violation(ViolationStrategy::Reject)
//!     .build();
//!
//! assert_eq!(rules.violation_strategy(), ViolationStrategy::Reject);
//! ```
//!
//! [`CallPolicy`] bounds collaborator calls with a timeout and a retry
//! budget for transient failures.

pub mod builder;
pub mod context;
pub mod policy;
pub mod rules;
pub mod violations;

pub use builder::RulesBuilder;
pub use context::DefinitionContext;
pub use policy::{CallPolicy, CallPolicyBuilder};
pub use rules::{shadowed_transitions, DefinitionCheck, DefinitionRules};
pub use violations::{ViolationError, ViolationStrategy};
