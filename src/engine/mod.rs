//! The workflow engine.
//!
//! [`WorkflowEngine::emit`] is the only way entities change status:
//!
//! 1. load the entity (`NotFound` if absent)
//! 2. match a transition; when none matches, hand the entity to the
//!    [`Fallback`] and stop
//! 3. run compensations (for compensating events) and `OnEvent` handlers
//! 4. set the new status and record the change
//! 5. run `OnStatusChange` handlers
//! 6. save
//!
//! Any handler failure aborts the emit before anything is saved.

mod error;
mod locks;
mod outcome;
mod session;
mod workflow;

pub use error::{ErrorClass, WorkflowError};
pub use locks::{UrnGuard, UrnLocks};
pub use outcome::{Emission, Fallback, FnFallback, ReconciliationItem};
pub use session::EntitySession;
pub use workflow::{WorkflowEngine, WorkflowEngineBuilder};
