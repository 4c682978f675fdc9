//! Multi-step orchestration over the workflow engine.
//!
//! A saga chains emits with calls to external services. Steps that must
//! not half-happen run under the entity's session on a detached task, and
//! failures late in a chain are compensated by driving the entity to a
//! terminal status rather than surfacing an error.

mod error;
mod order;

pub use error::SagaError;
pub use order::OrderSaga;
